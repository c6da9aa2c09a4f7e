use std::path::PathBuf;

use clap::Parser;

/// Run a compiled test suite repeatedly and stream per-test results as
/// newline-delimited JSON for a load-testing orchestrator.
#[derive(Debug, Default, Parser)]
#[command(name = "testloop", version, about)]
pub struct Cli {
    /// Number of iterations over the test suite (0 = decide from --duration)
    #[arg(short, long, value_name = "N", default_value_t = 0)]
    pub iterations: u32,

    /// Duration limit of the run in seconds, checked between iterations (0 = none)
    #[arg(short, long, value_name = "T", default_value_t = 0)]
    pub duration: u64,

    /// File the results are written to, one JSON object per line
    #[arg(
        short,
        long = "report-file",
        value_name = "REPORT_FILE",
        default_value = "report.ldjson"
    )]
    pub report_file: PathBuf,

    /// Test suite to load tests from, relative to this executable's directory
    #[arg(short, long, value_name = "TARGET")]
    pub target: Option<String>,

    /// Test case filter expression passed to the engine (empty = all tests)
    #[arg(short, long, value_name = "EXPR", default_value = "")]
    pub filter: String,

    /// Engine config file (defaults to testloop.toml next to this executable)
    #[arg(short, long, value_name = "PATH", env = "TESTLOOP_CONFIG")]
    pub config: Option<PathBuf>,
}
