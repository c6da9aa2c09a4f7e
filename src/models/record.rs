use serde::{Deserialize, Serialize};

use super::status::TestStatus;

/// Open key/value metadata attached to a record. Nothing populates it yet,
/// but consumers expect the key to be present.
pub type Extras = serde_json::Map<String, serde_json::Value>;

/// One completed test case, as written to the report file (one JSON line each).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRecord {
    /// Unix epoch seconds (UTC) at which the test case started.
    #[serde(rename = "start_time")]
    pub start_time_epoch_seconds: i64,
    /// Wall-clock duration in seconds, sub-second precision kept.
    #[serde(rename = "duration")]
    pub duration_seconds: f64,
    #[serde(rename = "test_case")]
    pub test_case_name: String,
    #[serde(rename = "test_suite")]
    pub test_suite_name: String,
    pub status: TestStatus,
    #[serde(rename = "error_msg")]
    pub error_message: String,
    pub error_trace: String,
    #[serde(default)]
    pub extras: Extras,
}

/// Totals for a whole run, logged once the controller returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub iterations: u64,
    pub records: u64,
    pub passed: u64,
    pub failed: u64,
    pub skipped: u64,
    /// Events that produced no record because they were malformed or unmodeled.
    pub dropped_events: u64,
}

impl RunSummary {
    pub fn count(&mut self, record: &ReportRecord) {
        self.records += 1;
        match record.status {
            TestStatus::Passed => self.passed += 1,
            TestStatus::Failed => self.failed += 1,
            TestStatus::Skipped => self.skipped += 1,
        }
    }
}
