//! Semantic validation of the merged configuration.

use std::path::{Path, PathBuf};

use crate::error::{ConfigError, ConfigResult};
use crate::types::ServiceConfig;

/// Validate the configuration in place, canonicalizing the workspace root
/// and anchoring the restriction lists under it.
///
/// Rules:
/// - the workspace root must be absolute, exist, and be a directory;
/// - allowed subdirectories and blocked paths may be given relative to the
///   root; after anchoring, each must still fall under the root;
/// - byte limits and the per-minute budget must be non-zero;
/// - blocked patterns must be non-empty strings.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] describing the first failing rule.
pub fn validate(config: &mut ServiceConfig) -> ConfigResult<()> {
    if !config.workspace_root.is_absolute() {
        return Err(invalid(format!(
            "workspaceRoot must be absolute, got {}",
            config.workspace_root.display()
        )));
    }

    let root = config
        .workspace_root
        .canonicalize()
        .map_err(|e| invalid(format!("workspaceRoot is not usable: {e}")))?;
    if !root.is_dir() {
        return Err(invalid(format!(
            "workspaceRoot is not a directory: {}",
            root.display()
        )));
    }
    config.workspace_root = root;

    config.allowed_subdirectories = anchor_all(
        &config.workspace_root,
        &config.allowed_subdirectories,
        "allowedSubdirectories",
    )?;
    config.blocked_paths = anchor_all(&config.workspace_root, &config.blocked_paths, "blockedPaths")?;

    if config.blocked_patterns.iter().any(String::is_empty) {
        return Err(invalid("blockedPatterns entries must be non-empty".into()));
    }

    if config.max_file_size == 0 {
        return Err(invalid("maxFileSize must be greater than zero".into()));
    }
    if config.max_batch_size == 0 {
        return Err(invalid("maxBatchSize must be greater than zero".into()));
    }
    if config.max_operations_per_minute == 0 {
        return Err(invalid(
            "maxOperationsPerMinute must be greater than zero".into(),
        ));
    }

    Ok(())
}

fn invalid(reason: String) -> ConfigError {
    ConfigError::Invalid { reason }
}

/// Anchor each entry under the root and verify it stays there.
fn anchor_all(root: &Path, entries: &[PathBuf], field: &str) -> ConfigResult<Vec<PathBuf>> {
    entries
        .iter()
        .map(|entry| {
            let anchored = if entry.is_absolute() {
                entry.clone()
            } else {
                root.join(entry)
            };
            if anchored.starts_with(root) {
                Ok(anchored)
            } else {
                Err(invalid(format!(
                    "{field} entry escapes the workspace root: {}",
                    entry.display()
                )))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> ServiceConfig {
        ServiceConfig::with_root(dir.path())
    }

    #[test]
    fn test_valid_minimal_config() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir);
        validate(&mut config).unwrap();
        assert!(config.workspace_root.is_absolute());
    }

    #[test]
    fn test_relative_subdirs_are_anchored() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir);
        config.allowed_subdirectories = vec![PathBuf::from("src")];
        validate(&mut config).unwrap();
        assert!(config.allowed_subdirectories[0].starts_with(&config.workspace_root));
    }

    #[test]
    fn test_escaping_blocked_path_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir);
        config.blocked_paths = vec![PathBuf::from("/etc")];
        let err = validate(&mut config).unwrap_err();
        assert!(err.to_string().contains("blockedPaths"));
    }

    #[test]
    fn test_zero_limits_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir);
        config.max_file_size = 0;
        assert!(validate(&mut config).is_err());
    }

    #[test]
    fn test_missing_root_rejected() {
        let mut config = ServiceConfig::with_root("/nonexistent/cordon-ws");
        assert!(validate(&mut config).is_err());
    }
}
