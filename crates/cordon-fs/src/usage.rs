//! Disk usage analysis: a bounded-depth walk with best-effort skipping.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cordon_core::{AgentId, CordonError, CordonResult, FsOpError, OperationKind};
use cordon_policy::{resolve, PolicyEngine};
use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

/// How many top entries each report section carries.
const TOP_N: usize = 10;

/// One entry in a largest-files or largest-subdirectories list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LargestEntry {
    /// Path of the entry.
    pub path: String,
    /// Bytes attributed to it.
    pub bytes: u64,
}

/// The disk usage report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageReport {
    /// The analyzed directory.
    pub path: String,
    /// Total bytes across all files seen by the walk.
    pub total_bytes: u64,
    /// Number of files seen.
    pub file_count: u64,
    /// The ten largest files.
    pub largest_files: Vec<LargestEntry>,
    /// The ten largest immediate subdirectories by recursive size.
    pub largest_subdirectories: Vec<LargestEntry>,
    /// Bytes grouped by (lowercased) file extension, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_extension: Option<HashMap<String, u64>>,
}

/// Disk usage analysis over vetted directories.
#[derive(Debug)]
pub struct DiskUsageOps {
    engine: Arc<PolicyEngine>,
}

impl DiskUsageOps {
    /// Create usage analysis bound to a policy engine.
    #[must_use]
    pub fn new(engine: Arc<PolicyEngine>) -> Self {
        Self { engine }
    }

    /// Walk `path` down to `depth` levels and report sizes.
    ///
    /// Entries that fail re-validation against the policy, and entries the
    /// walker cannot read, are logged and skipped so the report stays
    /// best-effort. Symlinks contribute their own link size, never the
    /// target's.
    ///
    /// # Errors
    ///
    /// Security rejections of the root argument, or a filesystem error on
    /// the root itself.
    pub async fn analyze(
        &self,
        agent: &AgentId,
        path: &str,
        depth: usize,
        group_by_type: bool,
    ) -> CordonResult<UsageReport> {
        let vetted = self.engine.vet(path, OperationKind::Read, agent)?;
        let root = vetted.into_path_buf();
        let engine = Arc::clone(&self.engine);

        tokio::task::spawn_blocking(move || analyze_sync(&engine, &root, depth, group_by_type))
            .await
            .map_err(|e| {
                CordonError::Fs(FsOpError::Io(std::io::Error::other(format!(
                    "usage task failed: {e}"
                ))))
            })?
    }
}

fn analyze_sync(
    engine: &PolicyEngine,
    root: &Path,
    depth: usize,
    group_by_type: bool,
) -> CordonResult<UsageReport> {
    if !root.is_dir() {
        return Err(FsOpError::NotADirectory {
            path: root.to_path_buf(),
        }
        .into());
    }

    let max_depth = depth.max(1);
    let mut total_bytes = 0u64;
    let mut file_count = 0u64;
    let mut files: Vec<(PathBuf, u64)> = Vec::new();
    let mut subdir_bytes: HashMap<PathBuf, u64> = HashMap::new();
    let mut by_extension: HashMap<String, u64> = HashMap::new();

    for entry in WalkDir::new(root)
        .max_depth(max_depth)
        .follow_links(false)
        .into_iter()
    {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                debug!(error = %e, "skipping unreadable entry");
                continue;
            },
        };
        if entry.depth() == 0 {
            continue;
        }

        // Re-validate each entry; content that policy would refuse to serve
        // is not reported either.
        let entry_str = entry.path().to_string_lossy();
        if resolve(&entry_str, OperationKind::Read, engine.config()).is_err() {
            debug!(path = %entry_str, "skipping entry failing re-validation");
            continue;
        }

        // follow_links(false) makes this the symlink's own metadata.
        let meta = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                debug!(path = %entry_str, error = %e, "skipping entry without metadata");
                continue;
            },
        };
        if meta.is_dir() {
            continue;
        }

        let size = meta.len();
        total_bytes = total_bytes.saturating_add(size);
        file_count += 1;
        files.push((entry.path().to_path_buf(), size));

        if let Some(top) = immediate_child_of(root, entry.path()) {
            if top.is_dir() {
                *subdir_bytes.entry(top).or_insert(0) += size;
            }
        }

        if group_by_type {
            let ext = entry
                .path()
                .extension()
                .map_or_else(|| "(none)".to_owned(), |e| e.to_string_lossy().to_lowercase());
            *by_extension.entry(ext).or_insert(0) += size;
        }
    }

    files.sort_by(|a, b| b.1.cmp(&a.1));
    files.truncate(TOP_N);

    let mut subdirs: Vec<(PathBuf, u64)> = subdir_bytes.into_iter().collect();
    subdirs.sort_by(|a, b| b.1.cmp(&a.1));
    subdirs.truncate(TOP_N);

    Ok(UsageReport {
        path: root.display().to_string(),
        total_bytes,
        file_count,
        largest_files: files
            .into_iter()
            .map(|(path, bytes)| LargestEntry {
                path: path.display().to_string(),
                bytes,
            })
            .collect(),
        largest_subdirectories: subdirs
            .into_iter()
            .map(|(path, bytes)| LargestEntry {
                path: path.display().to_string(),
                bytes,
            })
            .collect(),
        by_extension: group_by_type.then_some(by_extension),
    })
}

/// The immediate child of `root` on the way to `path`, when there is one.
fn immediate_child_of(root: &Path, path: &Path) -> Option<PathBuf> {
    let rel = path.strip_prefix(root).ok()?;
    let first = rel.components().next()?;
    Some(root.join(first.as_os_str()))
}
