//! The layered path validation pipeline.
//!
//! Ten layers applied in fixed order; the first matching layer rejects.
//! The lexical screen runs before any resolution so traversal attempts are
//! reported as such even when resolution would have landed in bounds, and
//! the hardcoded screens run before user configuration so the most severe
//! category is the one reported.

use std::path::{Component, Path, PathBuf};

use cordon_core::{OperationKind, SecurityError};

use crate::config::{PolicyConfig, VettedPath, SYSTEM_PATHS};

/// Maximum symlink chain length before the pipeline rejects.
const MAX_SYMLINK_DEPTH: usize = 40;

/// A pipeline rejection: the typed error plus the forensic context the
/// violation record needs.
#[derive(Debug)]
pub struct Rejection {
    /// The typed security error.
    pub error: SecurityError,
    /// The raw input as supplied by the caller.
    pub input: String,
    /// The resolved path, when resolution got that far.
    pub resolved: Option<PathBuf>,
}

impl Rejection {
    fn early(error: SecurityError, input: &str) -> Self {
        Self {
            error,
            input: input.to_owned(),
            resolved: None,
        }
    }

    fn at(error: SecurityError, input: &str, resolved: &Path) -> Self {
        Self {
            error,
            input: input.to_owned(),
            resolved: Some(resolved.to_path_buf()),
        }
    }
}

impl From<Rejection> for SecurityError {
    fn from(r: Rejection) -> Self {
        r.error
    }
}

/// Run the full pipeline over one untrusted path argument.
///
/// # Errors
///
/// Returns a [`Rejection`] naming the first layer that fired.
pub fn resolve(
    input: &str,
    kind: OperationKind,
    policy: &PolicyConfig,
) -> Result<VettedPath, Rejection> {
    resolve_depth(input, kind, policy, 0)
}

fn resolve_depth(
    input: &str,
    kind: OperationKind,
    policy: &PolicyConfig,
    depth: usize,
) -> Result<VettedPath, Rejection> {
    // Layer 1: lexical traversal screen, before any resolution.
    if input.contains("..") || input.contains("./") || input.contains(".\\") {
        return Err(Rejection::early(
            SecurityError::PathTraversal {
                input: input.to_owned(),
            },
            input,
        ));
    }

    // Layer 2: join against the root and canonicalize lexically. Symlinks
    // are not followed here; they get their own layer at the end.
    let candidate = Path::new(input);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        policy.workspace_root.join(candidate)
    };
    let resolved = normalize(&joined);
    let resolved_str = resolved.to_string_lossy();

    // Layer 3: workspace boundary.
    if resolved != policy.workspace_root && !resolved.starts_with(&policy.workspace_root) {
        return Err(Rejection::at(
            SecurityError::WorkspaceEscape {
                resolved: resolved.clone(),
            },
            input,
            &resolved,
        ));
    }

    // Layer 4: hardcoded system paths. Non-overridable.
    if SYSTEM_PATHS.iter().any(|p| has_prefix(&resolved_str, p)) {
        return Err(Rejection::at(
            SecurityError::SystemPath {
                resolved: resolved.clone(),
            },
            input,
            &resolved,
        ));
    }

    // Layer 5: hardcoded sensitive patterns. Non-overridable.
    if policy
        .sensitive_patterns
        .iter()
        .any(|(_, re)| re.is_match(&resolved_str))
    {
        return Err(Rejection::at(
            SecurityError::SensitiveFile {
                resolved: resolved.clone(),
            },
            input,
            &resolved,
        ));
    }

    // Layer 6: allowed subdirectories, when configured.
    if !policy.allowed_subdirs.is_empty()
        && !policy
            .allowed_subdirs
            .iter()
            .any(|dir| resolved == *dir || resolved.starts_with(dir))
    {
        return Err(Rejection::at(
            SecurityError::SubdirRestriction {
                resolved: resolved.clone(),
            },
            input,
            &resolved,
        ));
    }

    // Layer 7: user blocklist prefixes.
    if policy.blocked_paths.iter().any(|p| resolved.starts_with(p)) {
        return Err(Rejection::at(
            SecurityError::BlockedPath {
                resolved: resolved.clone(),
            },
            input,
            &resolved,
        ));
    }

    // Layer 8: user patterns.
    if let Some((pattern, _)) = policy
        .blocked_patterns
        .iter()
        .find(|(_, re)| re.is_match(&resolved_str))
    {
        return Err(Rejection::at(
            SecurityError::BlockedPattern {
                resolved: resolved.clone(),
                pattern: pattern.clone(),
            },
            input,
            &resolved,
        ));
    }

    // Layer 9: read-only guard.
    if policy.read_only && kind.is_mutating() {
        return Err(Rejection::at(
            SecurityError::ReadOnly { kind },
            input,
            &resolved,
        ));
    }

    // Layer 10: symlink target recursion.
    vet_symlink_chain(input, kind, policy, depth, resolved)
}

/// If the resolved path is a symlink, vet its target through the whole
/// pipeline again. Filesystem errors here reject rather than pass.
fn vet_symlink_chain(
    input: &str,
    kind: OperationKind,
    policy: &PolicyConfig,
    depth: usize,
    resolved: PathBuf,
) -> Result<VettedPath, Rejection> {
    let meta = match std::fs::symlink_metadata(&resolved) {
        Ok(meta) => meta,
        // A path that does not exist yet cannot be a symlink.
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(VettedPath::new(resolved, kind));
        },
        Err(e) => {
            return Err(Rejection::at(
                SecurityError::SymlinkEscape {
                    link: resolved.clone(),
                    target: format!("<unreadable: {e}>"),
                },
                input,
                &resolved,
            ));
        },
    };

    if !meta.file_type().is_symlink() {
        return Ok(VettedPath::new(resolved, kind));
    }

    if depth >= MAX_SYMLINK_DEPTH {
        return Err(Rejection::at(
            SecurityError::SymlinkEscape {
                link: resolved.clone(),
                target: "<chain depth exceeded>".to_owned(),
            },
            input,
            &resolved,
        ));
    }

    let target = match std::fs::read_link(&resolved) {
        Ok(t) => t,
        Err(e) => {
            return Err(Rejection::at(
                SecurityError::SymlinkEscape {
                    link: resolved.clone(),
                    target: format!("<unreadable: {e}>"),
                },
                input,
                &resolved,
            ));
        },
    };

    // Resolve the target relative to the link's parent before recursing,
    // so an in-workspace relative target survives the lexical screen.
    let target_abs = if target.is_absolute() {
        normalize(&target)
    } else {
        let parent = resolved
            .parent()
            .unwrap_or_else(|| policy.workspace_root.as_path());
        normalize(&parent.join(&target))
    };

    match resolve_depth(
        &target_abs.to_string_lossy(),
        kind,
        policy,
        depth.saturating_add(1),
    ) {
        Ok(_) => Ok(VettedPath::new(resolved, kind)),
        Err(inner) => Err(Rejection::at(
            SecurityError::SymlinkEscape {
                link: resolved.clone(),
                target: target.display().to_string(),
            },
            input,
            inner.resolved.as_deref().unwrap_or(&resolved),
        )),
    }
}

/// Lexical canonicalization: collapse `.` segments and resolve `..`
/// against the accumulated path without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {},
            Component::ParentDir => {
                out.pop();
            },
            Component::Normal(c) => out.push(c),
        }
    }
    out
}

/// Platform-agnostic prefix match on whole path segments.
fn has_prefix(resolved: &str, prefix: &str) -> bool {
    resolved == prefix
        || resolved
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/') || rest.starts_with('\\'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cordon_config::ServiceConfig;
    use tempfile::TempDir;

    fn policy_for(dir: &TempDir) -> PolicyConfig {
        let service = ServiceConfig::with_root(dir.path().canonicalize().unwrap());
        PolicyConfig::from_service(&service).unwrap()
    }

    #[test]
    fn test_traversal_rejected_before_resolution() {
        let dir = TempDir::new().unwrap();
        let policy = policy_for(&dir);

        for input in ["../etc/passwd", "a/b/../c", ".\\x", "src/./main.rs"] {
            let err = resolve(input, OperationKind::Read, &policy).unwrap_err();
            assert!(
                matches!(err.error, SecurityError::PathTraversal { .. }),
                "{input} should be a traversal rejection"
            );
            assert!(err.resolved.is_none());
        }
    }

    #[test]
    fn test_relative_path_resolves_under_root() {
        let dir = TempDir::new().unwrap();
        let policy = policy_for(&dir);

        let vetted = resolve("src/main.rs", OperationKind::Read, &policy).unwrap();
        assert!(vetted.as_path().starts_with(policy.workspace_root()));
        assert_eq!(vetted.kind(), OperationKind::Read);
    }

    #[test]
    fn test_workspace_root_itself_is_vetted() {
        let dir = TempDir::new().unwrap();
        let policy = policy_for(&dir);

        let input = policy.workspace_root().to_string_lossy().into_owned();
        let vetted = resolve(&input, OperationKind::Read, &policy).unwrap();
        assert_eq!(vetted.as_path(), policy.workspace_root());
    }

    #[test]
    fn test_absolute_escape_rejected() {
        let dir = TempDir::new().unwrap();
        let policy = policy_for(&dir);

        let err = resolve("/var/outside", OperationKind::Read, &policy).unwrap_err();
        assert!(matches!(err.error, SecurityError::WorkspaceEscape { .. }));
        assert!(err.resolved.is_some());
    }

    #[test]
    fn test_sensitive_patterns_rejected() {
        let dir = TempDir::new().unwrap();
        let policy = policy_for(&dir);

        for input in [
            "home/.ssh/authorized_keys",
            "certs/server.pem",
            "MyPassword.txt",
            "API_TOKEN",
            ".env",
        ] {
            let err = resolve(input, OperationKind::Read, &policy).unwrap_err();
            assert!(
                matches!(err.error, SecurityError::SensitiveFile { .. }),
                "{input} should be a sensitive-file rejection"
            );
        }
    }

    #[test]
    fn test_allowed_subdir_restriction() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let mut service = ServiceConfig::with_root(&root);
        service.allowed_subdirectories = vec![root.join("src")];
        let policy = PolicyConfig::from_service(&service).unwrap();

        assert!(resolve("src/x.ts", OperationKind::Read, &policy).is_ok());
        let err = resolve("tests/x.ts", OperationKind::Read, &policy).unwrap_err();
        assert!(matches!(err.error, SecurityError::SubdirRestriction { .. }));
    }

    #[test]
    fn test_blocked_path_prefix() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let mut service = ServiceConfig::with_root(&root);
        service.blocked_paths = vec![root.join("vendor")];
        let policy = PolicyConfig::from_service(&service).unwrap();

        let err = resolve("vendor/lib.rs", OperationKind::Read, &policy).unwrap_err();
        assert!(matches!(err.error, SecurityError::BlockedPath { .. }));
    }

    #[test]
    fn test_blocked_pattern() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let mut service = ServiceConfig::with_root(&root);
        service.blocked_patterns = vec!["*.bak".into()];
        let policy = PolicyConfig::from_service(&service).unwrap();

        let err = resolve("data/old.bak", OperationKind::Read, &policy).unwrap_err();
        assert!(matches!(err.error, SecurityError::BlockedPattern { .. }));
    }

    #[test]
    fn test_read_only_rejects_mutations_only() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let mut service = ServiceConfig::with_root(&root);
        service.read_only = true;
        let policy = PolicyConfig::from_service(&service).unwrap();

        assert!(resolve("file.txt", OperationKind::Read, &policy).is_ok());
        for kind in [OperationKind::Write, OperationKind::Delete] {
            let err = resolve("file.txt", kind, &policy).unwrap_err();
            assert!(matches!(err.error, SecurityError::ReadOnly { .. }));
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_rejected() {
        let dir = TempDir::new().unwrap();
        let policy = policy_for(&dir);
        let link = policy.workspace_root().join("sneaky");
        std::os::unix::fs::symlink("/var/outside", &link).unwrap();

        let err = resolve("sneaky", OperationKind::Read, &policy).unwrap_err();
        assert!(matches!(err.error, SecurityError::SymlinkEscape { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_in_workspace_symlink_accepted() {
        let dir = TempDir::new().unwrap();
        let policy = policy_for(&dir);
        let root = policy.workspace_root().to_path_buf();
        std::fs::write(root.join("real.txt"), b"x").unwrap();
        std::os::unix::fs::symlink(root.join("real.txt"), root.join("alias")).unwrap();

        let vetted = resolve("alias", OperationKind::Read, &policy).unwrap();
        assert_eq!(vetted.as_path(), root.join("alias"));
    }

    #[cfg(unix)]
    #[test]
    fn test_relative_symlink_inside_workspace_accepted() {
        let dir = TempDir::new().unwrap();
        let policy = policy_for(&dir);
        let root = policy.workspace_root().to_path_buf();
        std::fs::create_dir(root.join("a")).unwrap();
        std::fs::write(root.join("target.txt"), b"x").unwrap();
        // Relative target climbing one level, still inside the workspace.
        std::os::unix::fs::symlink("../target.txt", root.join("a/link")).unwrap();

        assert!(resolve("a/link", OperationKind::Read, &policy).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_cycle_hits_depth_bound() {
        let dir = TempDir::new().unwrap();
        let policy = policy_for(&dir);
        let root = policy.workspace_root().to_path_buf();
        std::os::unix::fs::symlink(root.join("b_link"), root.join("a_link")).unwrap();
        std::os::unix::fs::symlink(root.join("a_link"), root.join("b_link")).unwrap();

        let err = resolve("a_link", OperationKind::Read, &policy).unwrap_err();
        assert!(matches!(err.error, SecurityError::SymlinkEscape { .. }));
    }

    #[test]
    fn test_normalize_collapses_dot_segments() {
        assert_eq!(
            normalize(Path::new("/ws/a/./b")),
            PathBuf::from("/ws/a/b")
        );
        assert_eq!(normalize(Path::new("/ws/a/../b")), PathBuf::from("/ws/b"));
    }

    #[test]
    fn test_system_prefix_matching() {
        assert!(has_prefix("/etc/passwd", "/etc"));
        assert!(has_prefix("/etc", "/etc"));
        assert!(!has_prefix("/etcetera", "/etc"));
    }
}
