use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::Cli;
use crate::error::HarnessError;

/// How many passes over the suite to make.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationLimit {
    Count(u32),
    /// Keep going until the duration limit trips.
    Unbounded,
}

impl IterationLimit {
    /// Whether iteration number `done` (1-based, already completed) was the last one.
    pub fn exhausted_after(&self, done: u64) -> bool {
        match self {
            IterationLimit::Count(n) => done >= u64::from(*n),
            IterationLimit::Unbounded => false,
        }
    }
}

impl fmt::Display for IterationLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IterationLimit::Count(n) => write!(f, "{n}"),
            IterationLimit::Unbounded => f.write_str("unbounded"),
        }
    }
}

/// Test selection expression. Empty means every test in the suite.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestFilter(Option<String>);

impl TestFilter {
    pub fn new(expr: &str) -> Self {
        let expr = expr.trim();
        if expr.is_empty() {
            Self::all()
        } else {
            Self(Some(expr.to_string()))
        }
    }

    pub fn all() -> Self {
        Self(None)
    }

    pub fn expression(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl fmt::Display for TestFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.expression().unwrap_or("<all tests>"))
    }
}

/// Resolved run configuration. Built once at startup, read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    pub iterations: IterationLimit,
    pub duration_limit: Option<Duration>,
    pub report_path: PathBuf,
    /// Canonical location of the loaded test suite.
    pub target: PathBuf,
    pub filter: TestFilter,
}

impl Options {
    /// Validate parsed flags into run options.
    ///
    /// `target` is resolved against `base_dir` (the executable's directory) and
    /// handed to `load`, which returns the location the engine will use.
    pub fn resolve<L>(cli: &Cli, base_dir: &Path, load: L) -> Result<Self, HarnessError>
    where
        L: FnOnce(&Path) -> anyhow::Result<PathBuf>,
    {
        let Some(target) = cli.target.as_deref().filter(|t| !t.trim().is_empty()) else {
            return Err(HarnessError::config(
                "target test suite not provided, pass it with --target",
            ));
        };

        let path = base_dir.join(target);
        let target = load(&path).map_err(|e| {
            HarnessError::config_with(format!("unable to load test suite: {}", path.display()), e)
        })?;

        let duration_limit = (cli.duration > 0).then(|| Duration::from_secs(cli.duration));
        let iterations = match (cli.iterations, duration_limit) {
            (0, Some(_)) => IterationLimit::Unbounded,
            (0, None) => IterationLimit::Count(1),
            (n, _) => IterationLimit::Count(n),
        };

        Ok(Self {
            iterations,
            duration_limit,
            report_path: cli.report_file.clone(),
            target,
            filter: TestFilter::new(&cli.filter),
        })
    }

    /// Print the resolved configuration to the diagnostic stream.
    pub fn log_summary(&self) {
        tracing::info!("Iterations: {}", self.iterations);
        tracing::info!("Hold for: {}s", self.duration_limit.map_or(0, |d| d.as_secs()));
        tracing::info!("Report file: {}", self.report_path.display());
        tracing::info!("Target: {}", self.target.display());
        if let Some(expr) = self.filter.expression() {
            tracing::info!("Test case filter: {expr}");
        }
    }
}
