//! Audit stream sinks.

use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::AuditResult;

/// Destination for serialized audit lines.
///
/// Implementations are driven by the background writer task; a slow sink
/// delays the stream, never the requests producing it.
pub trait AuditSink: Send + Sync {
    /// Append one serialized record (no trailing newline).
    ///
    /// # Errors
    ///
    /// Returns an error if the line cannot be written.
    fn write_line(&self, line: &str) -> AuditResult<()>;
}

/// Writes audit lines to standard error.
#[derive(Debug, Default)]
pub struct StderrSink;

impl AuditSink for StderrSink {
    fn write_line(&self, line: &str) -> AuditResult<()> {
        let mut stderr = std::io::stderr().lock();
        writeln!(stderr, "{line}")?;
        Ok(())
    }
}

/// Appends audit lines to a file, flushing per line.
#[derive(Debug)]
pub struct FileSink {
    file: Mutex<std::fs::File>,
}

impl FileSink {
    /// Open (or create) the audit file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: &Path) -> AuditResult<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl AuditSink for FileSink {
    fn write_line(&self, line: &str) -> AuditResult<()> {
        let mut file = self.file.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        writeln!(file, "{line}")?;
        file.flush()?;
        Ok(())
    }
}

/// Collects audit lines in memory. Test support.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of every line written so far.
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl AuditSink for MemorySink {
    fn write_line(&self, line: &str) -> AuditResult<()> {
        self.lines
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(line.to_owned());
        Ok(())
    }
}
