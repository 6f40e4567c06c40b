//! Symlink creation confined to the workspace.
//!
//! Links are written with a target *relative* to the link's parent so the
//! workspace stays relocatable.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use cordon_core::{AgentId, CordonError, CordonResult, FsOpError, OperationError};
use cordon_policy::PolicyEngine;
use tracing::info;

/// Symlink creation over vetted paths.
#[derive(Debug)]
pub struct SymlinkOps {
    engine: Arc<PolicyEngine>,
}

impl SymlinkOps {
    /// Create symlink operations bound to a policy engine.
    #[must_use]
    pub fn new(engine: Arc<PolicyEngine>) -> Self {
        Self { engine }
    }

    /// Create a symlink at `link` pointing to `target`.
    ///
    /// Both paths are vetted; a target outside the workspace rejects as a
    /// symlink escape and nothing is created.
    ///
    /// # Errors
    ///
    /// Security rejections, [`OperationError::SymlinkExists`] when the
    /// link path is taken, or filesystem errors.
    pub async fn create(&self, agent: &AgentId, link: &str, target: &str) -> CordonResult<()> {
        let (vetted_link, target_abs) = self.engine.vet_symlink(link, target, agent)?;
        let link = vetted_link.into_path_buf();

        tokio::task::spawn_blocking(move || create_sync(&link, &target_abs))
            .await
            .map_err(|e| {
                CordonError::Fs(FsOpError::Io(std::io::Error::other(format!(
                    "symlink task failed: {e}"
                ))))
            })?
    }
}

fn create_sync(link: &Path, target_abs: &Path) -> CordonResult<()> {
    if link.symlink_metadata().is_ok() {
        return Err(OperationError::SymlinkExists {
            path: link.to_path_buf(),
        }
        .into());
    }

    let parent = link.parent().ok_or_else(|| FsOpError::NotFound {
        path: link.to_path_buf(),
    })?;
    std::fs::create_dir_all(parent).map_err(|e| FsOpError::classify(parent, e))?;

    let relative = relative_from(parent, target_abs);
    write_symlink(&relative, link, target_abs)?;
    info!(link = %link.display(), target = %relative.display(), "symlink created");
    Ok(())
}

#[cfg(unix)]
fn write_symlink(relative: &Path, link: &Path, _target_abs: &Path) -> Result<(), FsOpError> {
    std::os::unix::fs::symlink(relative, link).map_err(|e| FsOpError::classify(link, e))
}

#[cfg(windows)]
fn write_symlink(relative: &Path, link: &Path, target_abs: &Path) -> Result<(), FsOpError> {
    if target_abs.is_dir() {
        std::os::windows::fs::symlink_dir(relative, link)
            .map_err(|e| FsOpError::classify(link, e))
    } else {
        std::os::windows::fs::symlink_file(relative, link)
            .map_err(|e| FsOpError::classify(link, e))
    }
}

/// Compute the relative path from `base` (a directory) to `target`.
fn relative_from(base: &Path, target: &Path) -> PathBuf {
    let base_parts: Vec<Component<'_>> = base.components().collect();
    let target_parts: Vec<Component<'_>> = target.components().collect();

    let common = base_parts
        .iter()
        .zip(target_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in common..base_parts.len() {
        out.push("..");
    }
    for part in &target_parts[common..] {
        out.push(part.as_os_str());
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::engine;
    use cordon_core::SecurityError;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_create_relative_link_inside_workspace() {
        let (dir, engine) = engine();
        let root = dir.path().canonicalize().unwrap();
        std::fs::create_dir_all(root.join("data")).unwrap();
        std::fs::write(root.join("data/file.txt"), b"payload").unwrap();

        let ops = SymlinkOps::new(engine);
        let agent = AgentId::new("a1");
        ops.create(&agent, "links/file", "data/file.txt")
            .await
            .unwrap();

        let link = root.join("links/file");
        let stored = std::fs::read_link(&link).unwrap();
        assert!(stored.is_relative());
        // Following the link lands inside the workspace.
        let resolved = link.parent().unwrap().join(&stored).canonicalize().unwrap();
        assert!(resolved.starts_with(&root));
        assert_eq!(std::fs::read(&link).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_escaping_target_rejected_without_side_effects() {
        let (dir, engine) = engine();
        let root = dir.path().canonicalize().unwrap();

        let ops = SymlinkOps::new(engine);
        let agent = AgentId::new("a1");
        let err = ops.create(&agent, "link", "/etc/passwd").await.unwrap_err();
        assert!(matches!(
            err,
            CordonError::Security(SecurityError::SymlinkEscape { .. })
        ));
        assert!(!root.join("link").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_existing_link_path_rejected() {
        let (dir, engine) = engine();
        let root = dir.path().canonicalize().unwrap();
        std::fs::write(root.join("occupied"), b"x").unwrap();
        std::fs::write(root.join("t.txt"), b"t").unwrap();

        let ops = SymlinkOps::new(engine);
        let agent = AgentId::new("a1");
        let err = ops.create(&agent, "occupied", "t.txt").await.unwrap_err();
        assert!(matches!(
            err,
            CordonError::Operation(OperationError::SymlinkExists { .. })
        ));
    }

    #[test]
    fn test_relative_from() {
        assert_eq!(
            relative_from(Path::new("/ws/links"), Path::new("/ws/data/f.txt")),
            PathBuf::from("../data/f.txt")
        );
        assert_eq!(
            relative_from(Path::new("/ws"), Path::new("/ws/f.txt")),
            PathBuf::from("f.txt")
        );
        assert_eq!(
            relative_from(Path::new("/ws/a"), Path::new("/ws/a")),
            PathBuf::from(".")
        );
    }
}
