//! Config file loading.
//!
//! Implements the `load()` sequence:
//! 1. Resolve the file path (explicit argument, else `CORDON_CONFIG`)
//! 2. Parse the JSON document (serde applies field defaults)
//! 3. Validate and canonicalize
//! 4. Return the effective `ServiceConfig`

use std::path::Path;

use tracing::info;

use crate::error::{ConfigError, ConfigResult};
use crate::types::ServiceConfig;
use crate::validate;

/// Environment variable naming the config file when no path is passed.
pub const CONFIG_ENV_VAR: &str = "CORDON_CONFIG";

/// Load and validate the configuration.
///
/// When `path` is `None`, `CORDON_CONFIG` names the file instead.
///
/// # Errors
///
/// Returns a [`ConfigError`] if no path can be resolved, the file is
/// unreadable or malformed, or validation fails.
pub fn load(path: Option<&Path>) -> ConfigResult<ServiceConfig> {
    let owned;
    let path = match path {
        Some(p) => p,
        None => {
            owned = std::env::var(CONFIG_ENV_VAR)
                .map_err(|_| ConfigError::NoConfigPath(CONFIG_ENV_VAR))?;
            Path::new(&owned)
        },
    };

    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    let mut config: ServiceConfig =
        serde_json::from_str(&raw).map_err(|source| ConfigError::ParseError {
            path: path.display().to_string(),
            source,
        })?;

    validate::validate(&mut config)?;
    info!(
        path = %path.display(),
        workspace_root = %config.workspace_root.display(),
        "loaded service config"
    );
    Ok(config)
}

/// Parse and validate a configuration from an in-memory JSON string.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the document is malformed or fails
/// validation.
pub fn load_from_str(raw: &str) -> ConfigResult<ServiceConfig> {
    let mut config: ServiceConfig =
        serde_json::from_str(raw).map_err(|source| ConfigError::ParseError {
            path: "<inline>".to_owned(),
            source,
        })?;
    validate::validate(&mut config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let ws = dir.path().join("ws");
        std::fs::create_dir(&ws).unwrap();

        let config_path = dir.path().join("cordon.json");
        std::fs::write(
            &config_path,
            format!(r#"{{"workspaceRoot": "{}"}}"#, ws.display()),
        )
        .unwrap();

        let config = load(Some(&config_path)).unwrap();
        assert_eq!(config.workspace_root, ws.canonicalize().unwrap());
    }

    #[test]
    fn test_load_missing_file() {
        let err = load(Some(Path::new("/nonexistent/cordon.json"))).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }

    #[test]
    fn test_load_from_str_rejects_relative_root() {
        let err = load_from_str(r#"{"workspaceRoot": "relative/ws"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }
}
