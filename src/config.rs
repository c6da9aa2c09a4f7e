use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::error::HarnessError;

pub const CONFIG_FILE_NAME: &str = "testloop.toml";

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
}

/// How the target suite is invoked to list and run its tests.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Command prepended to the target, split like a shell would.
    /// Example: "dotnet exec" or "mono --debug"
    pub launcher: Option<String>,
    /// Arguments that make the target print matching test identifiers, one per line.
    pub list_args: Vec<String>,
    /// Arguments that make the target run matching tests and stream completion events.
    pub run_args: Vec<String>,
    /// Flag placed before a non-empty filter expression.
    pub filter_flag: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            launcher: None,
            list_args: vec!["--list".into()],
            run_args: vec!["--run".into()],
            filter_flag: "--where".into(),
        }
    }
}

impl EngineConfig {
    /// Split the launcher into program and leading arguments.
    pub fn launcher_words(&self) -> anyhow::Result<Vec<String>> {
        match self.launcher.as_deref().map(str::trim) {
            None | Some("") => Ok(Vec::new()),
            Some(launcher) => shell_words::split(launcher)
                .with_context(|| format!("invalid engine launcher: {launcher}")),
        }
    }
}

impl Config {
    /// Load `testloop.toml` from `dir`, falling back to defaults if absent or invalid.
    pub fn load(dir: &Path) -> Self {
        let path = dir.join(CONFIG_FILE_NAME);
        let Ok(content) = std::fs::read_to_string(&path) else {
            return Self::default();
        };
        match toml::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), "ignoring invalid config file: {e}");
                Self::default()
            }
        }
    }

    /// Load an explicitly requested config file; any failure is a configuration error.
    pub fn load_file(path: &Path) -> Result<Self, HarnessError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HarnessError::config_with(format!("unable to read config file {}", path.display()), e)
        })?;
        toml::from_str(&content).map_err(|e| {
            HarnessError::config_with(format!("invalid config file {}", path.display()), e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path());
        assert_eq!(config.engine.list_args, vec!["--list"]);
        assert_eq!(config.engine.run_args, vec!["--run"]);
        assert_eq!(config.engine.filter_flag, "--where");
        assert!(config.engine.launcher_words().unwrap().is_empty());
    }

    #[test]
    fn partial_engine_section_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[engine]\nlauncher = \"dotnet exec --roll-forward 'Major'\"\nfilter_flag = \"--filter\"\n",
        )
        .unwrap();

        let config = Config::load(dir.path());
        assert_eq!(config.engine.filter_flag, "--filter");
        assert_eq!(config.engine.run_args, vec!["--run"]);
        assert_eq!(
            config.engine.launcher_words().unwrap(),
            vec!["dotnet", "exec", "--roll-forward", "Major"]
        );
    }

    #[test]
    fn invalid_implicit_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "[engine\n").unwrap();
        let config = Config::load(dir.path());
        assert_eq!(config.engine.filter_flag, "--where");
    }

    #[test]
    fn invalid_explicit_file_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "engine = 3\n").unwrap();
        let err = Config::load_file(&path).unwrap_err();
        assert!(matches!(err, HarnessError::Configuration { .. }));

        let missing = Config::load_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(missing.to_string().contains("absent.toml"));
    }

    #[test]
    fn unbalanced_launcher_quotes_are_rejected() {
        let engine = EngineConfig {
            launcher: Some("dotnet 'exec".into()),
            ..EngineConfig::default()
        };
        assert!(engine.launcher_words().is_err());
    }
}
