use std::path::PathBuf;

use thiserror::Error;

/// Fatal errors that end the process before or during a run.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("{message}")]
    Configuration {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("nothing to run, no tests were loaded (filter: {filter})")]
    NoTests { filter: String },

    #[error("test engine failed: {0:#}")]
    Engine(anyhow::Error),

    #[error("failed to write report file {path}")]
    Report {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl HarnessError {
    pub fn config(message: impl Into<String>) -> Self {
        HarnessError::Configuration {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_with(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        HarnessError::Configuration {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            HarnessError::Configuration { .. } => exit_codes::CONFIG_ERROR,
            HarnessError::NoTests { .. } => exit_codes::NO_TESTS,
            HarnessError::Engine(_) => exit_codes::ENGINE_ERROR,
            HarnessError::Report { .. } => exit_codes::REPORT_ERROR,
        }
    }
}

/// Process exit codes.
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USAGE: i32 = 1; // Command line could not be parsed
    pub const CONFIG_ERROR: i32 = 2;
    pub const NO_TESTS: i32 = 3;
    pub const ENGINE_ERROR: i32 = 4;
    pub const REPORT_ERROR: i32 = 5;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_error_keeps_its_cause() {
        let err = HarnessError::config_with(
            "unable to load test suite: /opt/suite.dll",
            anyhow::anyhow!("file not found"),
        );
        assert_eq!(err.to_string(), "unable to load test suite: /opt/suite.dll");
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("file not found"));
        assert_eq!(err.exit_code(), exit_codes::CONFIG_ERROR);
    }

    #[test]
    fn each_fatal_kind_has_a_distinct_exit_code() {
        let codes = [
            HarnessError::config("x").exit_code(),
            HarnessError::NoTests { filter: String::new() }.exit_code(),
            HarnessError::Engine(anyhow::anyhow!("boom")).exit_code(),
            HarnessError::Report {
                path: PathBuf::from("r.ldjson"),
                source: std::io::Error::other("disk full"),
            }
            .exit_code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            assert_ne!(*a, exit_codes::SUCCESS);
            assert_ne!(*a, exit_codes::USAGE);
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
