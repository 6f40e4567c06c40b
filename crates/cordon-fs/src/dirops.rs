//! Directory-level operations: recursive copy, newer-only sync, and
//! atomic replace.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use cordon_core::{AgentId, CordonError, CordonResult, FsOpError, OperationError, OperationKind};
use cordon_policy::{compile_glob, PolicyEngine};
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Statistics returned by `copy_directory`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CopyStats {
    /// Regular files copied. Directories are not counted.
    pub files_copied: u64,
    /// Sum of copied regular-file sizes.
    pub bytes_transferred: u64,
    /// Wall-clock duration of the copy.
    pub duration_ms: u64,
}

/// Statistics returned by `sync_directory`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncStats {
    /// Files copied because the destination was missing or older.
    pub files_copied: u64,
    /// Files skipped because the destination was at least as new.
    pub files_skipped: u64,
    /// Sum of copied regular-file sizes.
    pub bytes_transferred: u64,
    /// Wall-clock duration of the sync.
    pub duration_ms: u64,
}

/// Recursive copy, sync, and atomic replace over vetted paths.
#[derive(Debug)]
pub struct DirectoryOps {
    engine: Arc<PolicyEngine>,
}

impl DirectoryOps {
    /// Create directory operations bound to a policy engine.
    #[must_use]
    pub fn new(engine: Arc<PolicyEngine>) -> Self {
        Self { engine }
    }

    /// Copy `source` (a directory) into `destination` recursively.
    ///
    /// Exclusion globs are tested against each *source* child path. With
    /// `preserve_metadata`, file modes and modification times carry over.
    ///
    /// # Errors
    ///
    /// Security rejections, an invalid exclusion pattern, or the first
    /// filesystem error encountered (copy errors are not skipped).
    pub async fn copy_directory(
        &self,
        agent: &AgentId,
        source: &str,
        destination: &str,
        preserve_metadata: bool,
        exclusions: &[String],
    ) -> CordonResult<CopyStats> {
        let source = self.engine.vet(source, OperationKind::Read, agent)?;
        let dest = self.engine.vet(destination, OperationKind::Write, agent)?;
        let filters = compile_exclusions(exclusions)?;

        let source = source.into_path_buf();
        let dest = dest.into_path_buf();
        tokio::task::spawn_blocking(move || {
            let started = Instant::now();
            if !source.is_dir() {
                return Err(FsOpError::NotADirectory { path: source }.into());
            }
            let mut stats = CopyStats::default();
            copy_tree(&source, &dest, preserve_metadata, &filters, &mut stats)?;
            stats.duration_ms = started.elapsed().as_millis() as u64;
            Ok(stats)
        })
        .await
        .map_err(task_failed)?
    }

    /// Copy only files whose destination is missing or older than the
    /// source. Directories are created unconditionally; metadata is never
    /// preserved.
    ///
    /// # Errors
    ///
    /// Security rejections, an invalid exclusion pattern, or the first
    /// filesystem error encountered.
    pub async fn sync_directory(
        &self,
        agent: &AgentId,
        source: &str,
        destination: &str,
        exclusions: &[String],
    ) -> CordonResult<SyncStats> {
        let source = self.engine.vet(source, OperationKind::Read, agent)?;
        let dest = self.engine.vet(destination, OperationKind::Write, agent)?;
        let filters = compile_exclusions(exclusions)?;

        let source = source.into_path_buf();
        let dest = dest.into_path_buf();
        tokio::task::spawn_blocking(move || {
            let started = Instant::now();
            if !source.is_dir() {
                return Err(FsOpError::NotADirectory { path: source }.into());
            }
            let mut stats = SyncStats::default();
            sync_tree(&source, &dest, &filters, &mut stats)?;
            stats.duration_ms = started.elapsed().as_millis() as u64;
            Ok(stats)
        })
        .await
        .map_err(task_failed)?
    }

    /// Replace `target`'s content atomically: write a sibling temp file,
    /// then rename it into place.
    ///
    /// # Errors
    ///
    /// Security rejections, the per-file size cap, or
    /// [`OperationError::AtomicReplaceFailed`] (the temp file is removed).
    pub async fn atomic_replace(
        &self,
        agent: &AgentId,
        target: &str,
        content: Vec<u8>,
    ) -> CordonResult<()> {
        let target = self.engine.vet(target, OperationKind::Write, agent)?;
        self.engine.guard_file_size(content.len() as u64, agent)?;

        let target = target.into_path_buf();
        tokio::task::spawn_blocking(move || atomic_replace_sync(&target, &content))
            .await
            .map_err(task_failed)?
    }
}

fn task_failed(e: tokio::task::JoinError) -> CordonError {
    CordonError::Fs(FsOpError::Io(std::io::Error::other(format!(
        "blocking task failed: {e}"
    ))))
}

fn compile_exclusions(patterns: &[String]) -> CordonResult<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            compile_glob(p, false).map_err(|e| {
                cordon_core::ValidationError::InvalidArgument {
                    reason: format!("bad exclusion pattern {p:?}: {e}"),
                }
                .into()
            })
        })
        .collect()
}

fn excluded(path: &Path, filters: &[Regex]) -> bool {
    if filters.is_empty() {
        return false;
    }
    let s = path.to_string_lossy();
    filters.iter().any(|re| re.is_match(&s))
}

fn copy_tree(
    source: &Path,
    dest: &Path,
    preserve_metadata: bool,
    filters: &[Regex],
    stats: &mut CopyStats,
) -> CordonResult<()> {
    std::fs::create_dir_all(dest).map_err(|e| FsOpError::classify(dest, e))?;
    if preserve_metadata {
        mirror_metadata(source, dest);
    }

    for entry in std::fs::read_dir(source).map_err(|e| FsOpError::classify(source, e))? {
        let entry = entry.map_err(|e| FsOpError::classify(source, e))?;
        let child = entry.path();
        if excluded(&child, filters) {
            debug!(path = %child.display(), "excluded from copy");
            continue;
        }
        let target = dest.join(entry.file_name());
        let file_type = entry
            .file_type()
            .map_err(|e| FsOpError::classify(&child, e))?;

        if file_type.is_dir() {
            copy_tree(&child, &target, preserve_metadata, filters, stats)?;
        } else if file_type.is_file() {
            let bytes = std::fs::copy(&child, &target).map_err(|source_err| {
                FsOpError::CopyFailed {
                    path: child.clone(),
                    source: source_err,
                }
            })?;
            if preserve_metadata {
                mirror_metadata(&child, &target);
            }
            stats.files_copied += 1;
            stats.bytes_transferred = stats.bytes_transferred.saturating_add(bytes);
        } else {
            debug!(path = %child.display(), "skipping special entry");
        }
    }
    Ok(())
}

fn sync_tree(
    source: &Path,
    dest: &Path,
    filters: &[Regex],
    stats: &mut SyncStats,
) -> CordonResult<()> {
    std::fs::create_dir_all(dest).map_err(|e| FsOpError::classify(dest, e))?;

    for entry in std::fs::read_dir(source).map_err(|e| FsOpError::classify(source, e))? {
        let entry = entry.map_err(|e| FsOpError::classify(source, e))?;
        let child = entry.path();
        if excluded(&child, filters) {
            continue;
        }
        let target = dest.join(entry.file_name());
        let file_type = entry
            .file_type()
            .map_err(|e| FsOpError::classify(&child, e))?;

        if file_type.is_dir() {
            sync_tree(&child, &target, filters, stats)?;
        } else if file_type.is_file() {
            if destination_is_current(&child, &target) {
                stats.files_skipped += 1;
                continue;
            }
            let bytes = std::fs::copy(&child, &target).map_err(|source_err| {
                FsOpError::CopyFailed {
                    path: child.clone(),
                    source: source_err,
                }
            })?;
            stats.files_copied += 1;
            stats.bytes_transferred = stats.bytes_transferred.saturating_add(bytes);
        }
    }
    Ok(())
}

/// A destination counts as current when it exists and its mtime is at
/// least the source's.
fn destination_is_current(source: &Path, dest: &Path) -> bool {
    let Ok(dest_meta) = std::fs::metadata(dest) else {
        return false;
    };
    let (Ok(src_mtime), Ok(dest_mtime)) = (
        std::fs::metadata(source).and_then(|m| m.modified()),
        dest_meta.modified(),
    ) else {
        return false;
    };
    dest_mtime >= src_mtime
}

/// Best-effort mode and mtime mirroring; failures are logged, not fatal.
fn mirror_metadata(source: &Path, dest: &Path) {
    let Ok(meta) = std::fs::metadata(source) else {
        return;
    };
    if let Err(e) = std::fs::set_permissions(dest, meta.permissions()) {
        debug!(path = %dest.display(), error = %e, "could not preserve permissions");
    }
    if let Ok(mtime) = meta.modified() {
        if let Err(e) = filetime::set_file_mtime(dest, filetime::FileTime::from_system_time(mtime))
        {
            debug!(path = %dest.display(), error = %e, "could not preserve mtime");
        }
    }
}

fn atomic_replace_sync(target: &Path, content: &[u8]) -> CordonResult<()> {
    let parent = target
        .parent()
        .ok_or_else(|| FsOpError::NotFound {
            path: target.to_path_buf(),
        })?
        .to_path_buf();
    std::fs::create_dir_all(&parent).map_err(|e| FsOpError::classify(&parent, e))?;

    let suffix: u64 = rand::thread_rng().gen();
    let temp = parent.join(format!(".tmp-{suffix:016x}"));

    let result = std::fs::write(&temp, content)
        .and_then(|()| std::fs::rename(&temp, target));
    match result {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = std::fs::remove_file(&temp);
            Err(OperationError::AtomicReplaceFailed {
                path: target.to_path_buf(),
                error: e.to_string(),
            }
            .into())
        },
    }
}
