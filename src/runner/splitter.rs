use quick_xml::Reader;
use quick_xml::errors::{Error, IllFormedError};
use quick_xml::events::Event;

/// Cap on a single pending document; past this it is handed over as is and
/// the translator reports it as malformed.
const MAX_PENDING_BYTES: usize = 4 * 1024 * 1024;

/// Reassembles engine stdout lines into whole event documents.
///
/// A document starts on a line beginning with `<` and ends when its root
/// element closes, so failure messages and stack traces may span lines.
#[derive(Debug, Default)]
pub struct EventSplitter {
    pending: String,
}

enum Scan {
    /// Root closed; the document ends at this byte offset.
    Complete(usize),
    NeedsMore,
}

impl EventSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one output line (without its terminator) and return the documents
    /// it completed, in order.
    pub fn push_line(&mut self, line: &str) -> Vec<String> {
        if self.pending.is_empty() {
            let line = line.trim_start();
            if line.is_empty() {
                return Vec::new();
            }
            if !line.starts_with('<') {
                tracing::debug!(target: "testloop::engine", "{}", line.trim_end());
                return Vec::new();
            }
            self.pending.push_str(line);
        } else {
            self.pending.push('\n');
            self.pending.push_str(line);
        }

        let mut documents = Vec::new();
        while !self.pending.is_empty() {
            let end = match scan(&self.pending) {
                Scan::Complete(end) => end,
                Scan::NeedsMore if self.pending.len() > MAX_PENDING_BYTES => self.pending.len(),
                Scan::NeedsMore => break,
            };
            let rest = self.pending.split_off(end);
            let document = std::mem::replace(&mut self.pending, rest.trim_start().to_string());
            documents.push(document.trim_end().to_string());

            if !self.pending.is_empty() && !self.pending.starts_with('<') {
                tracing::debug!(target: "testloop::engine", "{}", self.pending.trim_end());
                self.pending.clear();
            }
        }
        documents
    }

    /// Whatever is left when the output ends. A truncated document is still
    /// returned so it gets reported.
    pub fn finish(self) -> Option<String> {
        let rest = self.pending.trim();
        (!rest.is_empty()).then(|| rest.to_string())
    }
}

fn scan(pending: &str) -> Scan {
    let mut reader = Reader::from_str(pending);
    let mut depth = 0usize;
    loop {
        match reader.read_event() {
            Ok(Event::Start(_)) => depth += 1,
            Ok(Event::End(_)) => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Scan::Complete(reader.buffer_position() as usize);
                }
            }
            Ok(Event::Empty(_)) if depth == 0 => {
                return Scan::Complete(reader.buffer_position() as usize);
            }
            Ok(Event::Eof) => return Scan::NeedsMore,
            Ok(_) => {}
            // Markup cut off by the end of the buffer: the next line continues it.
            Err(Error::Syntax(_)) | Err(Error::IllFormed(IllFormedError::MissingEndTag(_))) => {
                return Scan::NeedsMore;
            }
            // Broken beyond repair; hand it over whole.
            Err(_) => return Scan::Complete(pending.len()),
        }
    }
}
