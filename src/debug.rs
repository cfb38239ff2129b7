//! Collaborators that receive raw HTML responses for inspection.
//!
//! The client never writes to disk on its own; attach a sink to see what the
//! portal actually answered when a scraping step fails.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use log::{debug, warn};

pub trait DebugSink: Send + Sync {
    /// Receives a raw response body under a stable artifact name,
    /// e.g. `login_response.html`.
    fn capture(&self, name: &str, html: &str);
}

/// Writes every capture to `<dir>/<name>`, overwriting earlier dumps.
#[derive(Debug, Clone)]
pub struct FileDumpSink {
    dir: PathBuf,
}

impl FileDumpSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl DebugSink for FileDumpSink {
    fn capture(&self, name: &str, html: &str) {
        let path = self.dir.join(name);
        match std::fs::write(&path, html) {
            Ok(()) => debug!("Saved response to {}", path.display()),
            Err(e) => warn!("Couldn't save response to {}: {}", path.display(), e),
        }
    }
}

/// Keeps captures in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    captures: Arc<Mutex<Vec<(String, String)>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All `(name, html)` pairs captured so far, oldest first.
    pub fn captures(&self) -> Vec<(String, String)> {
        match self.captures.lock() {
            Ok(captures) => captures.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.captures()
            .into_iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, html)| html)
    }
}

impl DebugSink for MemorySink {
    fn capture(&self, name: &str, html: &str) {
        let mut captures = match self.captures.lock() {
            Ok(captures) => captures,
            Err(poisoned) => poisoned.into_inner(),
        };
        captures.push((name.to_string(), html.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_shares_buffer_between_clones() {
        let sink = MemorySink::new();
        let handle = sink.clone();
        handle.capture("login_response.html", "<p>first</p>");
        handle.capture("login_response.html", "<p>second</p>");

        assert_eq!(sink.captures().len(), 2);
        assert_eq!(
            sink.get("login_response.html").as_deref(),
            Some("<p>second</p>")
        );
        assert!(sink.get("draft_response.html").is_none());
    }

    #[test]
    fn file_sink_writes_named_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileDumpSink::new(dir.path());
        sink.capture("draft_response.html", "<html>draft</html>");

        let written = std::fs::read_to_string(dir.path().join("draft_response.html")).unwrap();
        assert_eq!(written, "<html>draft</html>");
    }
}
