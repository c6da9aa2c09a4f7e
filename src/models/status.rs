use serde::{Deserialize, Serialize};

/// Normalized outcome of one test case, as written to the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
}

impl TestStatus {
    /// Map an engine `result` attribute onto a status. Outcomes the report
    /// schema has no slot for (Inconclusive, Warning, ...) return `None`.
    pub fn from_engine_result(result: &str) -> Option<Self> {
        match result {
            "Passed" => Some(TestStatus::Passed),
            "Failed" => Some(TestStatus::Failed),
            "Skipped" => Some(TestStatus::Skipped),
            _ => None,
        }
    }
}
