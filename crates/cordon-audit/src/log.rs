//! The audit log handle and its background writer.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::error::AuditResult;
use crate::record::AuditLine;
use crate::sink::{AuditSink, FileSink, MemorySink, StderrSink};

enum Message {
    Line(AuditLine),
    Flush(oneshot::Sender<()>),
}

/// Cloneable handle to the audit stream.
///
/// Records are handed to a background task over an unbounded channel;
/// `record()` never blocks and never fails. A disabled log drops records
/// at the handle.
#[derive(Debug, Clone)]
pub struct AuditLog {
    tx: Option<mpsc::UnboundedSender<Message>>,
}

impl AuditLog {
    /// A log that discards everything.
    #[must_use]
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Stream records to standard error.
    #[must_use]
    pub fn stderr() -> Self {
        Self::with_sink(Arc::new(StderrSink))
    }

    /// Append records to the given file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn to_file(path: &Path) -> AuditResult<Self> {
        Ok(Self::with_sink(Arc::new(FileSink::open(path)?)))
    }

    /// Collect records in memory; returns the log and the backing sink.
    #[must_use]
    pub fn in_memory() -> (Self, MemorySink) {
        let sink = MemorySink::new();
        (Self::with_sink(Arc::new(sink.clone())), sink)
    }

    /// Drive an arbitrary sink. Must be called within a tokio runtime.
    #[must_use]
    pub fn with_sink(sink: Arc<dyn AuditSink>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                match msg {
                    Message::Line(line) => match serde_json::to_string(&line) {
                        Ok(serialized) => {
                            if let Err(e) = sink.write_line(&serialized) {
                                warn!(error = %e, "failed to write audit record");
                            }
                        },
                        Err(e) => warn!(error = %e, "failed to serialize audit record"),
                    },
                    Message::Flush(ack) => {
                        let _ = ack.send(());
                    },
                }
            }
        });
        Self { tx: Some(tx) }
    }

    /// Emit one record. Never blocks.
    pub fn record(&self, line: impl Into<AuditLine>) {
        if let Some(tx) = &self.tx {
            // Send fails only when the writer task is gone (runtime shutdown).
            let _ = tx.send(Message::Line(line.into()));
        }
    }

    /// Wait until every record submitted before this call has been written.
    pub async fn flush(&self) {
        if let Some(tx) = &self.tx {
            let (ack_tx, ack_rx) = oneshot::channel();
            if tx.send(Message::Flush(ack_tx)).is_ok() {
                let _ = ack_rx.await;
            }
        }
    }

    /// Whether records are being kept at all.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{AuditRecord, ViolationRecord};

    #[tokio::test]
    async fn test_records_reach_sink_in_order() {
        let (log, store) = AuditLog::in_memory();
        log.record(AuditRecord::success("watch_directory", vec!["/ws/src".into()]));
        log.record(ViolationRecord::new(
            "workspace_escape",
            "/elsewhere",
            Some("/elsewhere".into()),
            "/ws",
        ));
        log.flush().await;

        let lines = store.snapshot();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"AUDIT\""));
        assert!(lines[1].contains("\"SECURITY_VIOLATION\""));
    }

    #[tokio::test]
    async fn test_disabled_log_drops_records() {
        let log = AuditLog::disabled();
        assert!(!log.is_enabled());
        log.record(AuditRecord::success("stop_watch", vec![]));
        log.flush().await;
    }
}
