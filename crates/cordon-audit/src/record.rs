//! Audit record shapes.
//!
//! Two record kinds cross the stream: `AUDIT` lines for every completed
//! operation and `SECURITY_VIOLATION` lines for every rejection. The JSON
//! field names are part of the service contract.

use cordon_core::Timestamp;
use serde::{Deserialize, Serialize};

/// A successful (or failed-but-permitted) operation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// When the operation completed.
    pub timestamp: Timestamp,
    /// Always `"AUDIT"`.
    pub level: String,
    /// The operation name (e.g. `batch_operations`).
    pub operation: String,
    /// The vetted paths the operation touched.
    pub paths: Vec<String>,
    /// Outcome summary (`"ok"` or an error message).
    pub result: String,
}

impl AuditRecord {
    /// Record a successful operation.
    #[must_use]
    pub fn success(operation: impl Into<String>, paths: Vec<String>) -> Self {
        Self {
            timestamp: Timestamp::now(),
            level: "AUDIT".to_owned(),
            operation: operation.into(),
            paths,
            result: "ok".to_owned(),
        }
    }

    /// Record an operation that was permitted but failed.
    #[must_use]
    pub fn failure(
        operation: impl Into<String>,
        paths: Vec<String>,
        error: impl std::fmt::Display,
    ) -> Self {
        Self {
            timestamp: Timestamp::now(),
            level: "AUDIT".to_owned(),
            operation: operation.into(),
            paths,
            result: format!("error: {error}"),
        }
    }
}

/// A security rejection record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationRecord {
    /// When the rejection happened.
    pub timestamp: Timestamp,
    /// Always `"SECURITY_VIOLATION"`.
    pub level: String,
    /// The violation tag (e.g. `path_traversal`, `workspace_escape`).
    #[serde(rename = "type")]
    pub violation_type: String,
    /// The raw input path as supplied by the caller.
    pub input: String,
    /// The resolved path, when resolution got that far.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved: Option<String>,
    /// The workspace root the policy was enforcing.
    pub workspace_root: String,
}

impl ViolationRecord {
    /// Record a rejection.
    #[must_use]
    pub fn new(
        violation_type: impl Into<String>,
        input: impl Into<String>,
        resolved: Option<String>,
        workspace_root: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Timestamp::now(),
            level: "SECURITY_VIOLATION".to_owned(),
            violation_type: violation_type.into(),
            input: input.into(),
            resolved,
            workspace_root: workspace_root.into(),
        }
    }
}

/// One line on the audit stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AuditLine {
    /// An operation record.
    Audit(AuditRecord),
    /// A rejection record.
    Violation(ViolationRecord),
}

impl From<AuditRecord> for AuditLine {
    fn from(r: AuditRecord) -> Self {
        Self::Audit(r)
    }
}

impl From<ViolationRecord> for AuditLine {
    fn from(r: ViolationRecord) -> Self {
        Self::Violation(r)
    }
}
