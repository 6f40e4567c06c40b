//! Audit error types.

use thiserror::Error;

/// Errors raised by the audit stream.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The sink could not be opened or written.
    #[error("audit sink io error: {0}")]
    Io(#[from] std::io::Error),

    /// A record failed to serialize.
    #[error("audit record serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result type for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;
