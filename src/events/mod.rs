pub mod document;

pub use document::{EngineEvent, Outcome, TestCaseCompletion};

use crate::models::{Extras, ReportRecord, TestStatus};
use crate::runner::CompletionEvent;

/// What became of one completion event.
#[derive(Debug, Clone, PartialEq)]
pub enum Translation {
    Record(ReportRecord),
    /// Not a leaf test case (suite aggregation, run start, output...).
    Ignored,
    /// A test case that could not be reported: malformed or with an unmodeled result.
    Dropped,
}

/// Turn one engine completion event into at most one report record.
///
/// Never fails: malformed events and results without a report status are
/// logged and dropped so a single bad event cannot end the run.
pub fn translate(event: &CompletionEvent) -> Translation {
    tracing::debug!(event = %event.document(), "completion event");

    let completion = match document::parse(event.document()) {
        Ok(EngineEvent::TestCase(completion)) => completion,
        Ok(EngineEvent::Other { element }) => {
            tracing::debug!(%element, "ignoring non test-case event");
            return Translation::Ignored;
        }
        Err(e) => {
            tracing::warn!(event = %event.document(), "skipping malformed event: {e}");
            return Translation::Dropped;
        }
    };

    match to_record(completion) {
        Ok(record) => Translation::Record(record),
        Err(result) => {
            tracing::info!(%result, "no report status for result: {}", event.document());
            Translation::Dropped
        }
    }
}

/// Build the record for a validated test case, or hand back the result name
/// when it has no report status.
fn to_record(completion: TestCaseCompletion) -> Result<ReportRecord, String> {
    let (status, error_message, error_trace) = match completion.outcome {
        Outcome::Passed => (TestStatus::Passed, String::new(), String::new()),
        Outcome::Failed { message, trace } => (TestStatus::Failed, message, trace),
        Outcome::Skipped { reason } => (TestStatus::Skipped, reason, String::new()),
        Outcome::Unmodeled(result) => return Err(result),
    };

    Ok(ReportRecord {
        start_time_epoch_seconds: completion.start_time.timestamp(),
        duration_seconds: completion.duration_seconds,
        test_case_name: completion.method_name,
        test_suite_name: completion.class_name,
        status,
        error_message,
        error_trace,
        extras: Extras::new(),
    })
}
