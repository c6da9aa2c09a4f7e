use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use quick_xml::Reader;
use quick_xml::events::Event;
use serde::Deserialize;
use thiserror::Error;

use crate::models::TestStatus;

/// Why a completion event could not be turned into a report record.
#[derive(Debug, Error, PartialEq)]
pub enum MalformedEventError {
    #[error("event is not a well-formed document: {0}")]
    Document(String),
    #[error("test-case is missing required attribute '{0}'")]
    MissingAttribute(&'static str),
    #[error("failed test-case has no failure block")]
    MissingFailure,
    #[error("failed test-case has no failure message")]
    MissingFailureMessage,
    #[error("invalid start-time '{0}'")]
    InvalidStartTime(String),
    #[error("invalid duration '{0}'")]
    InvalidDuration(String),
}

/// A completion event after validation.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A single test case finished.
    TestCase(TestCaseCompletion),
    /// Any other element (suite aggregation, run start, captured output...).
    Other { element: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestCaseCompletion {
    pub method_name: String,
    pub class_name: String,
    pub start_time: DateTime<Utc>,
    pub duration_seconds: f64,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Passed,
    Failed { message: String, trace: String },
    Skipped { reason: String },
    /// A result the report schema has no status for, kept verbatim.
    Unmodeled(String),
}

// --- XML deserialization types ---

#[derive(Debug, Deserialize)]
struct TestCaseElement {
    #[serde(rename = "@name")]
    name: Option<String>,
    #[serde(rename = "@methodname")]
    method_name: Option<String>,
    #[serde(rename = "@classname")]
    class_name: Option<String>,
    #[serde(rename = "@result")]
    result: Option<String>,
    #[serde(rename = "@start-time")]
    start_time: Option<String>,
    #[serde(rename = "@duration")]
    duration: Option<String>,
    failure: Option<FailureElement>,
    reason: Option<ReasonElement>,
}

#[derive(Debug, Deserialize)]
struct FailureElement {
    message: Option<String>,
    #[serde(rename = "stack-trace")]
    stack_trace: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReasonElement {
    message: Option<String>,
}

/// Parse one event document emitted by the engine.
pub fn parse(document: &str) -> Result<EngineEvent, MalformedEventError> {
    let element = root_element(document)?;
    if element != "test-case" {
        return Ok(EngineEvent::Other { element });
    }

    let raw: TestCaseElement = quick_xml::de::from_str(document)
        .map_err(|e| MalformedEventError::Document(e.to_string()))?;
    raw.validate().map(EngineEvent::TestCase)
}

fn root_element(document: &str) -> Result<String, MalformedEventError> {
    let mut reader = Reader::from_str(document);
    reader.config_mut().trim_text(true);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return Ok(String::from_utf8_lossy(e.name().as_ref()).into_owned());
            }
            Ok(Event::Eof) => {
                return Err(MalformedEventError::Document("no root element".into()));
            }
            Ok(_) => {}
            Err(e) => return Err(MalformedEventError::Document(e.to_string())),
        }
    }
}

impl TestCaseElement {
    fn validate(self) -> Result<TestCaseCompletion, MalformedEventError> {
        let start_time = parse_start_time(&required(self.start_time, "start-time")?)?;
        let duration_seconds = parse_duration(&required(self.duration, "duration")?)?;
        let method_name = match self.method_name {
            Some(m) => m,
            None => required(self.name, "methodname")?,
        };
        let class_name = required(self.class_name, "classname")?;

        let result = required(self.result, "result")?;
        let outcome = match TestStatus::from_engine_result(&result) {
            Some(TestStatus::Passed) => Outcome::Passed,
            Some(TestStatus::Failed) => {
                let failure = self.failure.ok_or(MalformedEventError::MissingFailure)?;
                let message = failure
                    .message
                    .ok_or(MalformedEventError::MissingFailureMessage)?;
                Outcome::Failed {
                    message: message.trim().to_string(),
                    trace: failure
                        .stack_trace
                        .map(|t| t.trim().to_string())
                        .unwrap_or_default(),
                }
            }
            Some(TestStatus::Skipped) => Outcome::Skipped {
                reason: self
                    .reason
                    .and_then(|r| r.message)
                    .map(|m| m.trim().to_string())
                    .unwrap_or_default(),
            },
            None => Outcome::Unmodeled(result),
        };

        Ok(TestCaseCompletion {
            method_name,
            class_name,
            start_time,
            duration_seconds,
            outcome,
        })
    }
}

fn required(value: Option<String>, name: &'static str) -> Result<String, MalformedEventError> {
    value.ok_or(MalformedEventError::MissingAttribute(name))
}

/// Parse an engine timestamp as a UTC instant. Offset-less forms are read as
/// UTC, never as host local time.
pub fn parse_start_time(raw: &str) -> Result<DateTime<Utc>, MalformedEventError> {
    let raw = raw.trim();
    // Relaxed RFC 3339: accepts "2017-07-28 14:02:47Z" as well as the 'T' form.
    if let Ok(dt) = raw.parse::<DateTime<FixedOffset>>() {
        return Ok(dt.with_timezone(&Utc));
    }
    const NAIVE_FORMATS: [&str; 3] = [
        "%Y-%m-%d %H:%M:%S%.fZ",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
    ];
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| MalformedEventError::InvalidStartTime(raw.to_string()))
}

/// Parse a duration in seconds. Only `.` is a decimal separator, whatever the
/// host locale says.
pub fn parse_duration(raw: &str) -> Result<f64, MalformedEventError> {
    let raw = raw.trim();
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(v),
        _ => Err(MalformedEventError::InvalidDuration(raw.to_string())),
    }
}
