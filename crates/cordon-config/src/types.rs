//! Configuration document types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default per-file size cap: 100 MiB.
pub(crate) const DEFAULT_MAX_FILE_SIZE: u64 = 104_857_600;

/// Default per-batch byte cap: 1 GiB.
pub(crate) const DEFAULT_MAX_BATCH_SIZE: u64 = 1_073_741_824;

/// Default per-agent operations-per-minute budget.
pub(crate) const DEFAULT_MAX_OPS_PER_MINUTE: u32 = 100;

/// The service configuration document.
///
/// Field names follow the wire convention of the configuration file
/// (camelCase). Everything except `workspaceRoot` has a default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ServiceConfig {
    /// Absolute path every operation is confined under.
    pub workspace_root: PathBuf,

    /// Optional narrowing: when non-empty, vetted paths must fall under at
    /// least one of these directories (absolute, or relative to the root).
    #[serde(default)]
    pub allowed_subdirectories: Vec<PathBuf>,

    /// Path prefixes (under the root) that are always rejected.
    #[serde(default)]
    pub blocked_paths: Vec<PathBuf>,

    /// Glob patterns matched against the full resolved path.
    #[serde(default)]
    pub blocked_patterns: Vec<String>,

    /// Per-file size cap in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Per-batch cumulative byte cap.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: u64,

    /// Optional cap on the number of operations in one batch.
    #[serde(default)]
    pub max_batch_operations: Option<usize>,

    /// Sliding-minute per-agent operation budget.
    #[serde(default = "default_max_ops_per_minute")]
    pub max_operations_per_minute: u32,

    /// Optional sliding-hour per-agent operation budget.
    #[serde(default)]
    pub max_operations_per_hour: Option<u32>,

    /// Whether the audit stream is written at all.
    #[serde(default = "default_true")]
    pub enable_audit_log: bool,

    /// Audit stream destination; stderr when unset.
    #[serde(default)]
    pub audit_log_file: Option<PathBuf>,

    /// Reject every write and delete when set.
    #[serde(default)]
    pub read_only: bool,
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

fn default_max_batch_size() -> u64 {
    DEFAULT_MAX_BATCH_SIZE
}

fn default_max_ops_per_minute() -> u32 {
    DEFAULT_MAX_OPS_PER_MINUTE
}

fn default_true() -> bool {
    true
}

impl ServiceConfig {
    /// A configuration with defaults for everything but the root.
    ///
    /// Used by tests and embedders that construct configs programmatically.
    #[must_use]
    pub fn with_root(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            allowed_subdirectories: Vec::new(),
            blocked_paths: Vec::new(),
            blocked_patterns: Vec::new(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_batch_operations: None,
            max_operations_per_minute: DEFAULT_MAX_OPS_PER_MINUTE,
            max_operations_per_hour: None,
            enable_audit_log: true,
            audit_log_file: None,
            read_only: false,
        }
    }
}
