pub mod process;
mod splitter;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::EngineConfig;
use crate::options::TestFilter;

pub use process::ProcessEngine;

/// One raw document emitted by the engine when something finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionEvent {
    document: String,
}

impl CompletionEvent {
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            document: document.into(),
        }
    }

    pub fn document(&self) -> &str {
        &self.document
    }
}

/// Trait for the test engine that discovers and executes the suite.
#[async_trait]
pub trait TestEngine: Send + Sync {
    /// Count the test cases selected by `filter`.
    async fn count_matching(&self, filter: &TestFilter) -> Result<usize>;

    /// Run the selected tests once, streaming one event per completion in
    /// emission order. Returns when the run is over.
    async fn execute(
        &self,
        filter: &TestFilter,
        tx: mpsc::UnboundedSender<CompletionEvent>,
    ) -> Result<()>;

    /// Display name for this engine (e.g., "process").
    fn name(&self) -> &str;
}

/// Construct the engine for an already loaded target.
pub fn detect(target: &Path, config: &EngineConfig) -> Result<Arc<dyn TestEngine>> {
    Ok(Arc::new(ProcessEngine::new(target.to_path_buf(), config)?))
}
