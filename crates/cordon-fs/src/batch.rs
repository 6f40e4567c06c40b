//! The atomic batch executor.
//!
//! Copy/move/delete sequences run strictly in order. Destructive steps
//! never unlink: a pre-existing move destination and every delete source
//! are renamed aside to a shadow path, so an atomic batch can be reversed
//! step by step when a later op fails. Rollback runs in reverse order and
//! is best-effort: a failing rollback step is logged and the remaining
//! steps still run.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cordon_core::{
    AgentId, CordonError, CordonResult, FsOpError, OperationError, OperationKind, ValidationError,
};
use cordon_policy::PolicyEngine;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// The kind of one batch operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOpKind {
    /// Copy source to destination.
    Copy,
    /// Move source to destination.
    Move,
    /// Delete source (renamed aside to a shadow path).
    Delete,
}

impl std::fmt::Display for BatchOpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Copy => write!(f, "copy"),
            Self::Move => write!(f, "move"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// One requested operation in a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOp {
    /// What to do.
    pub kind: BatchOpKind,
    /// Source path (untrusted; vetted before use).
    pub source: String,
    /// Destination path; required unless `kind` is delete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
}

/// Per-op outcome returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOpResult {
    /// Position in the submitted batch.
    pub index: usize,
    /// The op kind.
    pub kind: BatchOpKind,
    /// The source as submitted.
    pub source: String,
    /// The destination as submitted, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    /// Whether the op succeeded.
    pub ok: bool,
    /// Error message when it did not.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Shadow path holding displaced content (delete ops, shadowed moves).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shadow: Option<String>,
}

/// State captured per executed op, sufficient to reverse it.
#[derive(Debug)]
enum RollbackRecord {
    Copy {
        destination: PathBuf,
        destination_preexisted: bool,
    },
    Move {
        source: PathBuf,
        destination: PathBuf,
        shadow: Option<PathBuf>,
    },
    Delete {
        source: PathBuf,
        shadow: PathBuf,
    },
}

/// Executes copy/move/delete batches with rollback support.
#[derive(Debug)]
pub struct BatchExecutor {
    engine: Arc<PolicyEngine>,
    shadow_counter: AtomicU64,
}

impl BatchExecutor {
    /// Create an executor bound to a policy engine.
    #[must_use]
    pub fn new(engine: Arc<PolicyEngine>) -> Self {
        Self {
            engine,
            shadow_counter: AtomicU64::new(0),
        }
    }

    /// Execute a batch.
    ///
    /// Atomic mode pre-validates every op (no disk is touched if any path
    /// or the batch byte cap rejects) and rolls the whole batch back on
    /// the first runtime failure. Non-atomic mode captures each op's error
    /// and keeps going.
    ///
    /// # Errors
    ///
    /// Security and validation rejections, and in atomic mode
    /// [`OperationError::BatchFailed`] after rollback.
    pub async fn execute_batch(
        &self,
        agent: &AgentId,
        ops: Vec<BatchOp>,
        atomic: bool,
    ) -> CordonResult<Vec<BatchOpResult>> {
        for op in &ops {
            if op.kind != BatchOpKind::Delete && op.destination.is_none() {
                return Err(ValidationError::MissingDestination {
                    kind: op.kind.to_string(),
                }
                .into());
            }
        }

        if atomic {
            self.prevalidate(agent, &ops)?;
        }

        let engine = Arc::clone(&self.engine);
        let agent = agent.clone();
        let start_counter = self.next_counter_base();
        tokio::task::spawn_blocking(move || {
            run_batch(&engine, &agent, &ops, atomic, start_counter)
        })
        .await
        .map_err(|e| {
            CordonError::Operation(OperationError::BatchFailed {
                index: 0,
                error: format!("executor task failed: {e}"),
            })
        })?
    }

    /// Remove shadow-backup files under the workspace older than `max_age`.
    ///
    /// Shadows from successful non-atomic deletes persist by design; this
    /// is the explicit, opt-in collector. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the workspace cannot be walked.
    pub async fn sweep_shadows(&self, max_age: std::time::Duration) -> CordonResult<usize> {
        let root = self.engine.workspace_root().to_path_buf();
        tokio::task::spawn_blocking(move || sweep_shadows_sync(&root, max_age))
            .await
            .map_err(|e| {
                CordonError::Operation(OperationError::BatchFailed {
                    index: 0,
                    error: format!("sweep task failed: {e}"),
                })
            })?
    }

    /// Vet every path and enforce the batch byte cap before touching disk.
    fn prevalidate(&self, agent: &AgentId, ops: &[BatchOp]) -> CordonResult<()> {
        let mut total_bytes = 0u64;
        for op in ops {
            let source_kind = match op.kind {
                BatchOpKind::Delete => OperationKind::Delete,
                _ => OperationKind::Read,
            };
            let source = self.engine.vet(&op.source, source_kind, agent)?;
            if let Some(dest) = &op.destination {
                self.engine.vet(dest, OperationKind::Write, agent)?;
            }
            // Byte accounting covers transferring ops only; deletes move
            // content aside without copying it.
            if op.kind != BatchOpKind::Delete {
                if let Ok(meta) = std::fs::metadata(source.as_path()) {
                    total_bytes = total_bytes.saturating_add(recursive_hint(&meta));
                }
            }
        }
        self.engine.guard_batch(total_bytes, ops.len(), agent)?;
        Ok(())
    }

    /// Counter base for shadow names; each batch gets its own range so
    /// concurrent batches never race on a candidate name.
    fn next_counter_base(&self) -> u64 {
        self.shadow_counter.fetch_add(1000, Ordering::Relaxed)
    }
}

/// Size hint for the byte cap: file length, or zero for directories (their
/// contents are counted when copied file by file in directory operations).
fn recursive_hint(meta: &std::fs::Metadata) -> u64 {
    if meta.is_file() {
        meta.len()
    } else {
        0
    }
}

fn run_batch(
    engine: &PolicyEngine,
    agent: &AgentId,
    ops: &[BatchOp],
    atomic: bool,
    counter_base: u64,
) -> CordonResult<Vec<BatchOpResult>> {
    let mut results = Vec::with_capacity(ops.len());
    let mut rollback = Vec::with_capacity(ops.len());
    let mut counter = counter_base;

    for (index, op) in ops.iter().enumerate() {
        let outcome = run_one(engine, agent, op, &mut counter);
        match outcome {
            Ok((record, shadow)) => {
                debug!(index, kind = %op.kind, source = %op.source, "batch op done");
                rollback.push(record);
                results.push(BatchOpResult {
                    index,
                    kind: op.kind,
                    source: op.source.clone(),
                    destination: op.destination.clone(),
                    ok: true,
                    error: None,
                    shadow: shadow.map(|p| p.display().to_string()),
                });
            },
            Err(e) => {
                if atomic {
                    warn!(index, error = %e, "atomic batch failed, rolling back");
                    roll_back(&mut rollback);
                    return Err(OperationError::BatchFailed {
                        index,
                        error: e.to_string(),
                    }
                    .into());
                }
                results.push(BatchOpResult {
                    index,
                    kind: op.kind,
                    source: op.source.clone(),
                    destination: op.destination.clone(),
                    ok: false,
                    error: Some(e.to_string()),
                    shadow: None,
                });
            },
        }
    }

    info!(
        ops = ops.len(),
        failed = results.iter().filter(|r| !r.ok).count(),
        atomic,
        "batch complete"
    );
    Ok(results)
}

/// Execute one op, returning its rollback record and any shadow path.
fn run_one(
    engine: &PolicyEngine,
    agent: &AgentId,
    op: &BatchOp,
    counter: &mut u64,
) -> CordonResult<(RollbackRecord, Option<PathBuf>)> {
    match op.kind {
        BatchOpKind::Copy => {
            let source = engine.vet(&op.source, OperationKind::Read, agent)?;
            let dest_input = op.destination.as_deref().unwrap_or_default();
            let dest = engine.vet(dest_input, OperationKind::Write, agent)?;

            if !source.as_path().exists() {
                return Err(FsOpError::SourceMissing {
                    path: source.as_path().to_path_buf(),
                }
                .into());
            }
            let destination_preexisted = dest.as_path().exists();
            ensure_parent(dest.as_path())?;
            copy_recursive(source.as_path(), dest.as_path())?;
            Ok((
                RollbackRecord::Copy {
                    destination: dest.into_path_buf(),
                    destination_preexisted,
                },
                None,
            ))
        },
        BatchOpKind::Move => {
            let source = engine.vet(&op.source, OperationKind::Read, agent)?;
            let dest_input = op.destination.as_deref().unwrap_or_default();
            let dest = engine.vet(dest_input, OperationKind::Write, agent)?;

            if !source.as_path().exists() {
                return Err(FsOpError::SourceMissing {
                    path: source.as_path().to_path_buf(),
                }
                .into());
            }
            let shadow = if dest.as_path().exists() {
                let shadow = shadow_path(dest.as_path(), counter);
                rename(dest.as_path(), &shadow)?;
                Some(shadow)
            } else {
                None
            };
            ensure_parent(dest.as_path())?;
            rename(source.as_path(), dest.as_path())?;
            Ok((
                RollbackRecord::Move {
                    source: source.into_path_buf(),
                    destination: dest.into_path_buf(),
                    shadow: shadow.clone(),
                },
                shadow,
            ))
        },
        BatchOpKind::Delete => {
            let source = engine.vet(&op.source, OperationKind::Delete, agent)?;
            if !source.as_path().exists() {
                return Err(FsOpError::NotFound {
                    path: source.as_path().to_path_buf(),
                }
                .into());
            }
            let shadow = shadow_path(source.as_path(), counter);
            rename(source.as_path(), &shadow)?;
            Ok((
                RollbackRecord::Delete {
                    source: source.into_path_buf(),
                    shadow: shadow.clone(),
                },
                Some(shadow),
            ))
        },
    }
}

/// Reverse executed ops in reverse order. Each step is attempted even when
/// an earlier reversal failed.
fn roll_back(records: &mut Vec<RollbackRecord>) {
    while let Some(record) = records.pop() {
        let result = match &record {
            RollbackRecord::Copy {
                destination,
                destination_preexisted,
            } => {
                if *destination_preexisted {
                    // Overwritten in place; nothing recoverable.
                    Ok(())
                } else {
                    remove_any(destination)
                }
            },
            RollbackRecord::Move {
                source,
                destination,
                shadow,
            } => rename_io(destination, source).and_then(|()| match shadow {
                Some(shadow) => rename_io(shadow, destination),
                None => Ok(()),
            }),
            RollbackRecord::Delete { source, shadow } => rename_io(shadow, source),
        };

        if let Err(e) = result {
            error!(?record, error = %e, "rollback step failed; continuing");
        }
    }
}

fn ensure_parent(path: &Path) -> Result<(), FsOpError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| FsOpError::classify(parent, e))?;
    }
    Ok(())
}

fn rename(from: &Path, to: &Path) -> Result<(), FsOpError> {
    std::fs::rename(from, to).map_err(|source| FsOpError::RenameFailed {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    })
}

fn rename_io(from: &Path, to: &Path) -> std::io::Result<()> {
    std::fs::rename(from, to)
}

fn remove_any(path: &Path) -> std::io::Result<()> {
    if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}

/// Copy a file, or a directory tree recursively.
fn copy_recursive(source: &Path, dest: &Path) -> Result<(), FsOpError> {
    let meta = std::fs::symlink_metadata(source).map_err(|e| FsOpError::classify(source, e))?;
    if meta.is_dir() {
        std::fs::create_dir_all(dest).map_err(|e| FsOpError::classify(dest, e))?;
        for entry in std::fs::read_dir(source).map_err(|e| FsOpError::classify(source, e))? {
            let entry = entry.map_err(|e| FsOpError::classify(source, e))?;
            copy_recursive(&entry.path(), &dest.join(entry.file_name()))?;
        }
        Ok(())
    } else {
        std::fs::copy(source, dest)
            .map(|_| ())
            .map_err(|source_err| FsOpError::CopyFailed {
                path: source.to_path_buf(),
                source: source_err,
            })
    }
}

/// Next free `<path>.backup-<n>` name.
fn shadow_path(path: &Path, counter: &mut u64) -> PathBuf {
    loop {
        *counter = counter.wrapping_add(1);
        let candidate = PathBuf::from(format!("{}.backup-{}", path.display(), counter));
        if !candidate.exists() {
            return candidate;
        }
    }
}

fn sweep_shadows_sync(root: &Path, max_age: std::time::Duration) -> CordonResult<usize> {
    let pattern = regex::Regex::new(r"\.backup-\d+$").map_err(|e| {
        CordonError::Operation(OperationError::BatchFailed {
            index: 0,
            error: format!("shadow pattern: {e}"),
        })
    })?;

    let cutoff = std::time::SystemTime::now()
        .checked_sub(max_age)
        .unwrap_or(std::time::UNIX_EPOCH);
    let mut removed = 0usize;

    for entry in walkdir::WalkDir::new(root).follow_links(false) {
        let Ok(entry) = entry else { continue };
        let name = entry.file_name().to_string_lossy();
        if !pattern.is_match(&name) {
            continue;
        }
        let old_enough = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .is_some_and(|mtime| mtime <= cutoff);
        if !old_enough {
            continue;
        }
        match remove_any(entry.path()) {
            Ok(()) => {
                debug!(path = %entry.path().display(), "swept shadow backup");
                removed = removed.saturating_add(1);
            },
            Err(e) => warn!(path = %entry.path().display(), error = %e, "failed to sweep shadow"),
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::engine;

    fn op(kind: BatchOpKind, source: &str, destination: Option<&str>) -> BatchOp {
        BatchOp {
            kind,
            source: source.to_owned(),
            destination: destination.map(str::to_owned),
        }
    }

    #[tokio::test]
    async fn test_atomic_batch_success() {
        let (dir, engine) = engine();
        let root = dir.path().canonicalize().unwrap();
        std::fs::write(root.join("a.txt"), b"alpha").unwrap();
        std::fs::write(root.join("m.txt"), b"mu").unwrap();

        let executor = BatchExecutor::new(engine);
        let agent = AgentId::new("a1");
        let results = executor
            .execute_batch(
                &agent,
                vec![
                    op(BatchOpKind::Copy, "a.txt", Some("copies/a.txt")),
                    op(BatchOpKind::Move, "m.txt", Some("moved.txt")),
                    op(BatchOpKind::Delete, "a.txt", None),
                ],
                true,
            )
            .await
            .unwrap();

        assert!(results.iter().all(|r| r.ok));
        assert_eq!(
            std::fs::read(root.join("copies/a.txt")).unwrap(),
            b"alpha"
        );
        assert_eq!(std::fs::read(root.join("moved.txt")).unwrap(), b"mu");
        assert!(!root.join("a.txt").exists());
        assert!(!root.join("m.txt").exists());
    }

    #[tokio::test]
    async fn test_atomic_failure_rolls_back() {
        let (dir, engine) = engine();
        let root = dir.path().canonicalize().unwrap();
        std::fs::write(root.join("a.txt"), b"alpha").unwrap();
        // "c.txt" is intentionally missing.

        let executor = BatchExecutor::new(engine);
        let agent = AgentId::new("a1");
        let err = executor
            .execute_batch(
                &agent,
                vec![
                    op(BatchOpKind::Copy, "a.txt", Some("b.txt")),
                    op(BatchOpKind::Copy, "c.txt", Some("d.txt")),
                ],
                true,
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CordonError::Operation(OperationError::BatchFailed { index: 1, .. })
        ));
        // Pre-batch state restored for the rolled-back op.
        assert!(!root.join("b.txt").exists());
        assert!(!root.join("d.txt").exists());
        assert_eq!(std::fs::read(root.join("a.txt")).unwrap(), b"alpha");
    }

    #[tokio::test]
    async fn test_rollback_restores_moved_and_deleted_content() {
        let (dir, engine) = engine();
        let root = dir.path().canonicalize().unwrap();
        std::fs::write(root.join("keep.txt"), b"keep").unwrap();
        std::fs::write(root.join("mv.txt"), b"move me").unwrap();
        std::fs::write(root.join("existing.txt"), b"old dest").unwrap();

        let executor = BatchExecutor::new(engine);
        let agent = AgentId::new("a1");
        let err = executor
            .execute_batch(
                &agent,
                vec![
                    op(BatchOpKind::Delete, "keep.txt", None),
                    op(BatchOpKind::Move, "mv.txt", Some("existing.txt")),
                    op(BatchOpKind::Copy, "missing.txt", Some("never.txt")),
                ],
                true,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CordonError::Operation(OperationError::BatchFailed { index: 2, .. })
        ));

        // Everything is back, including the shadowed move destination.
        assert_eq!(std::fs::read(root.join("keep.txt")).unwrap(), b"keep");
        assert_eq!(std::fs::read(root.join("mv.txt")).unwrap(), b"move me");
        assert_eq!(std::fs::read(root.join("existing.txt")).unwrap(), b"old dest");
    }

    #[tokio::test]
    async fn test_non_atomic_continues_past_failures() {
        let (dir, engine) = engine();
        let root = dir.path().canonicalize().unwrap();
        std::fs::write(root.join("a.txt"), b"alpha").unwrap();

        let executor = BatchExecutor::new(engine);
        let agent = AgentId::new("a1");
        let results = executor
            .execute_batch(
                &agent,
                vec![
                    op(BatchOpKind::Copy, "missing.txt", Some("x.txt")),
                    op(BatchOpKind::Copy, "a.txt", Some("b.txt")),
                ],
                false,
            )
            .await
            .unwrap();

        assert!(!results[0].ok);
        assert!(results[0].error.is_some());
        assert!(results[1].ok);
        assert!(root.join("b.txt").exists());
    }

    #[tokio::test]
    async fn test_delete_leaves_shadow_with_content() {
        let (dir, engine) = engine();
        let root = dir.path().canonicalize().unwrap();
        std::fs::write(root.join("doomed.txt"), b"payload").unwrap();

        let executor = BatchExecutor::new(engine);
        let agent = AgentId::new("a1");
        let results = executor
            .execute_batch(&agent, vec![op(BatchOpKind::Delete, "doomed.txt", None)], false)
            .await
            .unwrap();

        assert!(!root.join("doomed.txt").exists());
        let shadow = results[0].shadow.as_ref().unwrap();
        assert_eq!(std::fs::read(shadow).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_missing_destination_rejected_before_io() {
        let (_dir, engine) = engine();
        let executor = BatchExecutor::new(engine);
        let agent = AgentId::new("a1");

        let err = executor
            .execute_batch(&agent, vec![op(BatchOpKind::Copy, "a", None)], false)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CordonError::Validation(ValidationError::MissingDestination { .. })
        ));
    }

    #[tokio::test]
    async fn test_prevalidation_rejects_oversized_batch() {
        let (dir, _) = engine();
        let root = dir.path().canonicalize().unwrap();
        std::fs::write(root.join("big.bin"), vec![0u8; 4096]).unwrap();

        let mut service = cordon_config::ServiceConfig::with_root(&root);
        service.max_batch_size = 1024;
        let policy = cordon_policy::PolicyConfig::from_service(&service).unwrap();
        let engine = Arc::new(PolicyEngine::new(policy, cordon_audit::AuditLog::disabled()));

        let executor = BatchExecutor::new(engine);
        let agent = AgentId::new("a1");
        let err = executor
            .execute_batch(
                &agent,
                vec![op(BatchOpKind::Copy, "big.bin", Some("copy.bin"))],
                true,
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CordonError::Validation(ValidationError::BatchSizeExceeded { .. })
        ));
        assert!(!root.join("copy.bin").exists());
    }

    #[tokio::test]
    async fn test_directory_copy_and_rollback() {
        let (dir, engine) = engine();
        let root = dir.path().canonicalize().unwrap();
        std::fs::create_dir_all(root.join("tree/sub")).unwrap();
        std::fs::write(root.join("tree/sub/f.txt"), b"leaf").unwrap();

        let executor = BatchExecutor::new(engine);
        let agent = AgentId::new("a1");
        let err = executor
            .execute_batch(
                &agent,
                vec![
                    op(BatchOpKind::Copy, "tree", Some("tree2")),
                    op(BatchOpKind::Delete, "ghost", None),
                ],
                true,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CordonError::Operation(_)));
        // The copied tree was rolled back wholesale.
        assert!(!root.join("tree2").exists());
        assert!(root.join("tree/sub/f.txt").exists());
    }

    #[tokio::test]
    async fn test_sweep_shadows_removes_old_backups() {
        let (dir, engine) = engine();
        let root = dir.path().canonicalize().unwrap();
        std::fs::write(root.join("f.txt.backup-3"), b"old").unwrap();
        std::fs::write(root.join("f.txt"), b"live").unwrap();

        let executor = BatchExecutor::new(engine);
        let removed = executor
            .sweep_shadows(std::time::Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(!root.join("f.txt.backup-3").exists());
        assert!(root.join("f.txt").exists());
    }
}
