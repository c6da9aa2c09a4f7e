use std::fs::File;
use std::io::{self, LineWriter, Write};
use std::path::{Path, PathBuf};

use crate::models::ReportRecord;

/// Append-only sink for report records, one JSON object per line.
///
/// Lines are flushed as they are written so consumers can tail the file
/// during a run. `finish` releases the handle; dropping an unfinished writer
/// still flushes whatever was buffered.
pub struct ReportWriter<W: Write> {
    path: PathBuf,
    writer: Option<LineWriter<W>>,
}

impl ReportWriter<File> {
    /// Create (or truncate) the report file.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(path, file))
    }
}

impl<W: Write> ReportWriter<W> {
    pub fn new(path: &Path, inner: W) -> Self {
        Self {
            path: path.to_path_buf(),
            writer: Some(LineWriter::new(inner)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_record(&mut self, record: &ReportRecord) -> io::Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::other("report writer already closed"))?;
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        writer.write_all(&line)
    }

    /// Flush and release the underlying writer.
    pub fn finish(mut self) -> io::Result<W> {
        let writer = self
            .writer
            .take()
            .ok_or_else(|| io::Error::other("report writer already closed"))?;
        writer.into_inner().map_err(|e| e.into_error())
    }
}

impl<W: Write> Drop for ReportWriter<W> {
    fn drop(&mut self) {
        if let Some(ref mut writer) = self.writer {
            let _ = writer.flush();
        }
    }
}
