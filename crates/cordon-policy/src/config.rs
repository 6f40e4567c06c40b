//! Compiled policy configuration and the vetted-path witness type.

use std::path::{Path, PathBuf};

use cordon_config::ServiceConfig;
use cordon_core::OperationKind;
use regex::Regex;
use thiserror::Error;

use crate::glob::compile_glob;

/// Built-in absolute prefixes that are always rejected, regardless of user
/// configuration.
pub(crate) const SYSTEM_PATHS: &[&str] = &[
    "/etc",
    "/sys",
    "/proc",
    "/dev",
    "/boot",
    "/root",
    "/bin",
    "/sbin",
    "/usr/bin",
    "/usr/sbin",
    "/System",
    "/Library",
    "/Applications",
    "C:\\Windows",
    "C:\\Program Files",
    "C:\\Program Files (x86)",
];

/// Built-in patterns covering credentials, keys, and env files. The
/// `password` / `secret` / `token` entries match case-insensitively.
pub(crate) const SENSITIVE_PATTERNS: &[(&str, bool)] = &[
    (".ssh/", false),
    (".aws/", false),
    (".kube/", false),
    ("id_rsa", false),
    ("*.pem", false),
    ("*.key", false),
    ("*.p12", false),
    ("*.pfx", false),
    ("password", true),
    ("secret", true),
    ("token", true),
    (".env", false),
];

/// Errors raised while compiling a [`PolicyConfig`].
#[derive(Debug, Error)]
pub enum PolicyBuildError {
    /// A configured blocked pattern failed to compile.
    #[error("cannot compile blocked pattern {pattern:?}: {source}")]
    PatternCompile {
        /// The offending pattern.
        pattern: String,
        /// The regex engine's error.
        source: regex::Error,
    },
}

/// Immutable, compiled policy state.
///
/// Built once from the service configuration; the hardcoded system and
/// sensitive screens are baked in and cannot be widened by configuration.
#[derive(Debug)]
pub struct PolicyConfig {
    pub(crate) workspace_root: PathBuf,
    pub(crate) allowed_subdirs: Vec<PathBuf>,
    pub(crate) blocked_paths: Vec<PathBuf>,
    pub(crate) blocked_patterns: Vec<(String, Regex)>,
    pub(crate) sensitive_patterns: Vec<(String, Regex)>,
    pub(crate) max_file_size: u64,
    pub(crate) max_batch_size: u64,
    pub(crate) max_batch_operations: Option<usize>,
    pub(crate) max_ops_per_minute: u32,
    pub(crate) max_ops_per_hour: Option<u32>,
    pub(crate) read_only: bool,
}

impl PolicyConfig {
    /// Compile the policy from a validated service configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyBuildError`] if a blocked pattern cannot compile.
    pub fn from_service(config: &ServiceConfig) -> Result<Self, PolicyBuildError> {
        let blocked_patterns = config
            .blocked_patterns
            .iter()
            .map(|p| {
                compile_glob(p, false)
                    .map(|re| (p.clone(), re))
                    .map_err(|source| PolicyBuildError::PatternCompile {
                        pattern: p.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            workspace_root: config.workspace_root.clone(),
            allowed_subdirs: config.allowed_subdirectories.clone(),
            blocked_paths: config.blocked_paths.clone(),
            blocked_patterns,
            sensitive_patterns: compile_sensitive(),
            max_file_size: config.max_file_size,
            max_batch_size: config.max_batch_size,
            max_batch_operations: config.max_batch_operations,
            max_ops_per_minute: config.max_operations_per_minute,
            max_ops_per_hour: config.max_operations_per_hour,
            read_only: config.read_only,
        })
    }

    /// The workspace root every vetted path falls under.
    #[must_use]
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Per-file byte cap.
    #[must_use]
    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Per-batch byte cap.
    #[must_use]
    pub fn max_batch_size(&self) -> u64 {
        self.max_batch_size
    }

    /// Whether the workspace is configured read-only.
    #[must_use]
    pub fn read_only(&self) -> bool {
        self.read_only
    }
}

/// The built-in sensitive screens compile with the canonical grammar; the
/// list is a compile-time constant so failure here is unreachable, but the
/// code stays fail-closed by filtering rather than unwrapping.
fn compile_sensitive() -> Vec<(String, Regex)> {
    SENSITIVE_PATTERNS
        .iter()
        .filter_map(|(pattern, ci)| {
            compile_glob(pattern, *ci)
                .ok()
                .map(|re| ((*pattern).to_owned(), re))
        })
        .collect()
}

/// An absolute path that has passed every validation layer for a specific
/// operation kind.
///
/// Only the resolver constructs these; filesystem effects consume them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VettedPath {
    path: PathBuf,
    kind: OperationKind,
}

impl VettedPath {
    pub(crate) fn new(path: PathBuf, kind: OperationKind) -> Self {
        Self { path, kind }
    }

    /// The vetted absolute path.
    #[must_use]
    pub fn as_path(&self) -> &Path {
        &self.path
    }

    /// The operation kind this path was vetted for.
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Consume the witness, yielding the path.
    #[must_use]
    pub fn into_path_buf(self) -> PathBuf {
        self.path
    }
}

impl std::fmt::Display for VettedPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

impl AsRef<Path> for VettedPath {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}
