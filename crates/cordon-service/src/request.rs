//! Wire request shapes.

use cordon_fs::BatchOp;
use cordon_search::SearchQuery;
use serde::{Deserialize, Serialize};

fn default_depth() -> usize {
    10
}

/// A request naming one of the twelve service operations.
///
/// The transport identifies operations by string; the tag deserializes
/// that string into this closed enum at the edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Request {
    /// Execute a copy/move/delete batch.
    BatchOperations {
        /// The operations, in execution order.
        operations: Vec<BatchOp>,
        /// All-or-nothing with rollback when set.
        #[serde(default)]
        atomic: bool,
    },

    /// Start a directory watch session.
    WatchDirectory {
        /// Directory to watch.
        path: String,
        /// Watch the whole subtree when set.
        #[serde(default)]
        recursive: bool,
        /// Glob filters; non-empty restricts buffered events.
        #[serde(default)]
        filters: Vec<String>,
    },

    /// Snapshot a session's buffered events.
    GetWatchEvents {
        /// The session to read.
        session_id: String,
        /// Also empty the buffer after the snapshot.
        #[serde(default)]
        clear: bool,
    },

    /// Stop a watch session.
    StopWatch {
        /// The session to stop.
        session_id: String,
    },

    /// Search the workspace by name, content, or both.
    SearchFiles {
        /// The search parameters.
        #[serde(flatten)]
        query: SearchQuery,
    },

    /// Build the metadata index over a subtree.
    BuildIndex {
        /// Subtree root to index.
        path: String,
        /// Capture file contents for content search.
        #[serde(default)]
        include_content: bool,
    },

    /// Create an in-workspace symlink.
    CreateSymlink {
        /// Where the link is written.
        link_path: String,
        /// What it points to (must stay in-workspace).
        target_path: String,
    },

    /// Compute a file checksum.
    ComputeChecksum {
        /// The file to hash.
        path: String,
        /// md5 / sha1 / sha256 / sha512.
        algorithm: String,
    },

    /// Verify a file against an expected checksum.
    VerifyChecksum {
        /// The file to hash.
        path: String,
        /// Expected hex digest (case-insensitive).
        expected: String,
        /// md5 / sha1 / sha256 / sha512.
        algorithm: String,
    },

    /// Analyze disk usage under a directory.
    AnalyzeDiskUsage {
        /// The directory to analyze.
        path: String,
        /// Walk depth bound.
        #[serde(default = "default_depth")]
        depth: usize,
        /// Also report a by-extension histogram.
        #[serde(default)]
        group_by_type: bool,
    },

    /// Recursively copy a directory.
    CopyDirectory {
        /// Source directory.
        source: String,
        /// Destination directory.
        destination: String,
        /// Preserve file modes and mtimes.
        #[serde(default)]
        preserve_metadata: bool,
        /// Exclusion globs tested against source paths.
        #[serde(default)]
        exclusions: Vec<String>,
    },

    /// Copy only newer files into the destination.
    SyncDirectory {
        /// Source directory.
        source: String,
        /// Destination directory.
        destination: String,
        /// Exclusion globs tested against source paths.
        #[serde(default)]
        exclusions: Vec<String>,
    },
}

impl Request {
    /// The operation name as it appears on the wire and in audit lines.
    #[must_use]
    pub fn operation(&self) -> &'static str {
        match self {
            Self::BatchOperations { .. } => "batch_operations",
            Self::WatchDirectory { .. } => "watch_directory",
            Self::GetWatchEvents { .. } => "get_watch_events",
            Self::StopWatch { .. } => "stop_watch",
            Self::SearchFiles { .. } => "search_files",
            Self::BuildIndex { .. } => "build_index",
            Self::CreateSymlink { .. } => "create_symlink",
            Self::ComputeChecksum { .. } => "compute_checksum",
            Self::VerifyChecksum { .. } => "verify_checksum",
            Self::AnalyzeDiskUsage { .. } => "analyze_disk_usage",
            Self::CopyDirectory { .. } => "copy_directory",
            Self::SyncDirectory { .. } => "sync_directory",
        }
    }

    /// The untrusted path arguments carried by this request, for audit.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        match self {
            Self::BatchOperations { operations, .. } => operations
                .iter()
                .flat_map(|op| {
                    std::iter::once(op.source.clone()).chain(op.destination.clone())
                })
                .collect(),
            Self::WatchDirectory { path, .. }
            | Self::BuildIndex { path, .. }
            | Self::ComputeChecksum { path, .. }
            | Self::VerifyChecksum { path, .. }
            | Self::AnalyzeDiskUsage { path, .. } => vec![path.clone()],
            Self::CreateSymlink {
                link_path,
                target_path,
            } => vec![link_path.clone(), target_path.clone()],
            Self::CopyDirectory {
                source,
                destination,
                ..
            }
            | Self::SyncDirectory {
                source,
                destination,
                ..
            } => vec![source.clone(), destination.clone()],
            Self::GetWatchEvents { .. } | Self::StopWatch { .. } | Self::SearchFiles { .. } => {
                Vec::new()
            },
        }
    }
}
