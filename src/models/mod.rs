pub mod record;
pub mod status;

pub use record::{Extras, ReportRecord, RunSummary};
pub use status::TestStatus;
