//! Boundary error taxonomy for cordon operations.
//!
//! Four classes cross the service boundary, each with stable codes:
//! security rejections (`SEC-*`), argument validation (`VAL-*`),
//! filesystem failures (`FS-*`), and operation failures (`OP-*`).
//! Security rejections are never retried and never swallowed.

use std::path::PathBuf;

use thiserror::Error;

/// Security rejections raised by the path validation pipeline, the rate
/// limiter, and the policy engine's emergency modes.
#[derive(Debug, Clone, Error)]
pub enum SecurityError {
    /// The literal input contained a traversal sequence.
    #[error("path traversal attempt rejected: {input}")]
    PathTraversal {
        /// The raw input path as supplied by the caller.
        input: String,
    },

    /// The resolved path falls outside the workspace root.
    #[error("path resolves outside the workspace: {resolved}")]
    WorkspaceEscape {
        /// The fully resolved path.
        resolved: PathBuf,
    },

    /// The resolved path enters a protected operating-system directory.
    #[error("system path access denied: {resolved}")]
    SystemPath {
        /// The fully resolved path.
        resolved: PathBuf,
    },

    /// The resolved path matches a built-in sensitive pattern.
    #[error("sensitive file access denied: {resolved}")]
    SensitiveFile {
        /// The fully resolved path.
        resolved: PathBuf,
    },

    /// The resolved path lies outside every allowed subdirectory.
    #[error("path outside allowed subdirectories: {resolved}")]
    SubdirRestriction {
        /// The fully resolved path.
        resolved: PathBuf,
    },

    /// The resolved path begins with a user-blocked prefix.
    #[error("path blocked by policy: {resolved}")]
    BlockedPath {
        /// The fully resolved path.
        resolved: PathBuf,
    },

    /// The resolved path matches a user-configured blocked pattern.
    #[error("path matches blocked pattern {pattern:?}: {resolved}")]
    BlockedPattern {
        /// The fully resolved path.
        resolved: PathBuf,
        /// The pattern that matched, as configured.
        pattern: String,
    },

    /// A mutating operation was attempted while the workspace is read-only.
    #[error("workspace is read-only; {kind} operations are rejected")]
    ReadOnly {
        /// The operation kind that was rejected.
        kind: crate::OperationKind,
    },

    /// A symlink chain leads outside the workspace (or exceeds the depth bound).
    #[error("symlink escapes the workspace: {link} -> {target}")]
    SymlinkEscape {
        /// The link path that was being vetted.
        link: PathBuf,
        /// The offending target.
        target: String,
    },

    /// The agent exceeded its sliding-window operation budget.
    #[error("rate limit exceeded for {agent}")]
    RateLimit {
        /// The agent that hit the limit.
        agent: String,
    },

    /// The administrator engaged the emergency stop; all access is rejected.
    #[error("emergency stop is active; all operations are rejected")]
    EmergencyStop,

    /// Emergency read-only mode is engaged; mutating access is rejected.
    #[error("emergency read-only mode is active; {kind} operations are rejected")]
    EmergencyReadOnly {
        /// The operation kind that was rejected.
        kind: crate::OperationKind,
    },
}

impl SecurityError {
    /// Stable boundary code for this rejection.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::PathTraversal { .. } => "SEC-001",
            Self::WorkspaceEscape { .. } => "SEC-002",
            Self::SystemPath { .. } => "SEC-003",
            Self::SensitiveFile { .. } => "SEC-004",
            Self::SubdirRestriction { .. } => "SEC-005",
            Self::BlockedPath { .. } => "SEC-006",
            Self::BlockedPattern { .. } => "SEC-007",
            Self::ReadOnly { .. } => "SEC-008",
            Self::SymlinkEscape { .. } => "SEC-009",
            Self::RateLimit { .. } => "SEC-010",
            Self::EmergencyStop => "SEC-011",
            Self::EmergencyReadOnly { .. } => "SEC-012",
        }
    }

    /// The snake_case tag recorded in the violation audit line.
    #[must_use]
    pub fn violation_tag(&self) -> &'static str {
        match self {
            Self::PathTraversal { .. } => "path_traversal",
            Self::WorkspaceEscape { .. } => "workspace_escape",
            Self::SystemPath { .. } => "system_path_access",
            Self::SensitiveFile { .. } => "sensitive_file_access",
            Self::SubdirRestriction { .. } => "subdirectory_restriction",
            Self::BlockedPath { .. } => "blocked_path",
            Self::BlockedPattern { .. } => "blocked_pattern",
            Self::ReadOnly { .. } => "read_only",
            Self::SymlinkEscape { .. } => "symlink_escape",
            Self::RateLimit { .. } => "rate_limit",
            Self::EmergencyStop => "emergency_stop",
            Self::EmergencyReadOnly { .. } => "emergency_read_only",
        }
    }
}

/// Argument validation errors raised before any I/O.
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    /// A request argument is malformed.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// Why the argument was rejected.
        reason: String,
    },

    /// A copy or move operation arrived without a destination.
    #[error("destination is required for {kind} operations")]
    MissingDestination {
        /// The batch op kind missing its destination.
        kind: String,
    },

    /// The requested checksum algorithm is not supported.
    #[error("unsupported checksum algorithm: {algorithm}")]
    UnsupportedAlgorithm {
        /// The algorithm as requested.
        algorithm: String,
    },

    /// A single file exceeds the configured size cap.
    #[error("file size {size} exceeds the limit of {limit} bytes")]
    FileSizeExceeded {
        /// Observed size in bytes.
        size: u64,
        /// Configured cap in bytes.
        limit: u64,
    },

    /// A batch's cumulative bytes exceed the configured cap.
    #[error("batch size {total} exceeds the limit of {limit} bytes")]
    BatchSizeExceeded {
        /// Cumulative source bytes.
        total: u64,
        /// Configured cap in bytes.
        limit: u64,
    },
}

impl ValidationError {
    /// Stable boundary code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => "VAL-001",
            Self::MissingDestination { .. } => "VAL-002",
            Self::UnsupportedAlgorithm { .. } => "VAL-003",
            Self::FileSizeExceeded { .. } => "VAL-004",
            Self::BatchSizeExceeded { .. } => "VAL-005",
        }
    }
}

/// Filesystem failures surfaced from the operating system.
#[derive(Debug, Error)]
pub enum FsOpError {
    /// The path does not exist.
    #[error("not found: {path}")]
    NotFound {
        /// The missing path.
        path: PathBuf,
    },

    /// The OS denied access.
    #[error("permission denied: {path}")]
    PermissionDenied {
        /// The inaccessible path.
        path: PathBuf,
    },

    /// The destination already exists.
    #[error("already exists: {path}")]
    AlreadyExists {
        /// The conflicting path.
        path: PathBuf,
    },

    /// A directory was expected.
    #[error("not a directory: {path}")]
    NotADirectory {
        /// The offending path.
        path: PathBuf,
    },

    /// A regular file was expected.
    #[error("is a directory: {path}")]
    IsADirectory {
        /// The offending path.
        path: PathBuf,
    },

    /// Directory removal failed because it still has entries.
    #[error("directory not empty: {path}")]
    DirectoryNotEmpty {
        /// The non-empty directory.
        path: PathBuf,
    },

    /// The filesystem is out of space.
    #[error("no space left on device")]
    NoSpace,

    /// A batch source vanished between validation and execution.
    #[error("source missing: {path}")]
    SourceMissing {
        /// The vanished source path.
        path: PathBuf,
    },

    /// A copy failed partway.
    #[error("copy failed for {path}: {source}")]
    CopyFailed {
        /// The path being copied.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A rename failed.
    #[error("rename failed {from} -> {to}: {source}")]
    RenameFailed {
        /// Rename source.
        from: PathBuf,
        /// Rename destination.
        to: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Any other I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FsOpError {
    /// Stable boundary code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "FS-001",
            Self::PermissionDenied { .. } => "FS-002",
            Self::AlreadyExists { .. } => "FS-003",
            Self::NotADirectory { .. } => "FS-004",
            Self::IsADirectory { .. } => "FS-005",
            Self::DirectoryNotEmpty { .. } => "FS-006",
            Self::NoSpace => "FS-007",
            Self::SourceMissing { .. } => "FS-008",
            Self::CopyFailed { .. } => "FS-009",
            Self::RenameFailed { .. } => "FS-010",
            Self::Io(_) => "FS-011",
        }
    }

    /// Classify a raw I/O error against the path it occurred on.
    #[must_use]
    pub fn classify(path: &std::path::Path, err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound => Self::NotFound {
                path: path.to_path_buf(),
            },
            ErrorKind::PermissionDenied => Self::PermissionDenied {
                path: path.to_path_buf(),
            },
            ErrorKind::AlreadyExists => Self::AlreadyExists {
                path: path.to_path_buf(),
            },
            ErrorKind::StorageFull => Self::NoSpace,
            _ => Self::Io(err),
        }
    }
}

/// Operation-level failures (sessions, batches, checksums).
#[derive(Debug, Error)]
pub enum OperationError {
    /// The watch session id is already live.
    #[error("watch session already exists: {id}")]
    SessionExists {
        /// The duplicate session id.
        id: String,
    },

    /// No live watch session has this id.
    #[error("watch session not found: {id}")]
    SessionNotFound {
        /// The unknown session id.
        id: String,
    },

    /// An atomic batch failed and was rolled back.
    #[error("batch failed at operation {index}: {error}")]
    BatchFailed {
        /// Index of the op that failed.
        index: usize,
        /// Message of the originating error.
        error: String,
    },

    /// The file changed while its checksum was being computed.
    #[error("file modified during read: {path}")]
    FileModified {
        /// The file that changed under us.
        path: PathBuf,
    },

    /// Atomic replace could not complete; the temp file was removed.
    #[error("atomic replace failed for {path}: {error}")]
    AtomicReplaceFailed {
        /// The replace target.
        path: PathBuf,
        /// Message of the underlying failure.
        error: String,
    },

    /// The platform watch facility failed.
    #[error("watch facility failure: {error}")]
    WatchFailed {
        /// Message from the facility.
        error: String,
    },

    /// The symlink path already exists.
    #[error("symlink path already exists: {path}")]
    SymlinkExists {
        /// The existing link path.
        path: PathBuf,
    },

    /// The search engine failed.
    #[error("search failed: {error}")]
    SearchFailed {
        /// Message from the engine.
        error: String,
    },
}

impl OperationError {
    /// Stable boundary code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::SessionExists { .. } => "OP-001",
            Self::SessionNotFound { .. } => "OP-002",
            Self::BatchFailed { .. } => "OP-003",
            Self::FileModified { .. } => "OP-004",
            Self::AtomicReplaceFailed { .. } => "OP-005",
            Self::WatchFailed { .. } => "OP-006",
            Self::SymlinkExists { .. } => "OP-007",
            Self::SearchFailed { .. } => "OP-008",
        }
    }
}

/// Top-level error union crossing the service boundary.
#[derive(Debug, Error)]
pub enum CordonError {
    /// A security rejection.
    #[error(transparent)]
    Security(#[from] SecurityError),

    /// An argument validation error.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A filesystem failure.
    #[error(transparent)]
    Fs(#[from] FsOpError),

    /// An operation failure.
    #[error(transparent)]
    Operation(#[from] OperationError),
}

impl CordonError {
    /// Stable boundary code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Security(e) => e.code(),
            Self::Validation(e) => e.code(),
            Self::Fs(e) => e.code(),
            Self::Operation(e) => e.code(),
        }
    }
}

/// Result type for cordon operations.
pub type CordonResult<T> = Result<T, CordonError>;
