//! The watch session registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use cordon_core::{AgentId, CordonResult, FsOpError, OperationError, OperationKind, WatchId};
use cordon_policy::{compile_glob, PolicyEngine};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use regex::Regex;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::event::{classify, FsEvent};

/// Maximum live sessions per registry.
const MAX_SESSIONS: usize = 64;

/// Soft cap on buffered events per session; past it, new events are
/// dropped cleanly and a warning is logged.
const MAX_BUFFERED_EVENTS: usize = 10_000;

struct WatchSession {
    /// Owning handle; dropping it stops the platform watcher.
    _watcher: RecommendedWatcher,
    buffer: Arc<Mutex<Vec<FsEvent>>>,
}

/// Multiplexes many concurrent watch sessions over the platform watch
/// facility.
pub struct WatchRegistry {
    engine: Arc<PolicyEngine>,
    sessions: RwLock<HashMap<WatchId, WatchSession>>,
}

impl WatchRegistry {
    /// Create a registry bound to a policy engine.
    #[must_use]
    pub fn new(engine: Arc<PolicyEngine>) -> Self {
        Self {
            engine,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Start a watch session rooted at `dir`.
    ///
    /// The id must be fresh, the directory must exist, and non-empty
    /// `filters` restrict buffering to events whose path matches at least
    /// one pattern.
    ///
    /// # Errors
    ///
    /// Security rejections, [`OperationError::SessionExists`],
    /// [`FsOpError::NotFound`]/[`FsOpError::NotADirectory`], or
    /// [`OperationError::WatchFailed`] if the platform facility refuses.
    pub async fn watch(
        &self,
        agent: &AgentId,
        id: WatchId,
        dir: &str,
        recursive: bool,
        filters: &[String],
    ) -> CordonResult<()> {
        let vetted = self.engine.vet(dir, OperationKind::Read, agent)?;
        let root = vetted.into_path_buf();
        if !root.exists() {
            return Err(FsOpError::NotFound { path: root }.into());
        }
        if !root.is_dir() {
            return Err(FsOpError::NotADirectory { path: root }.into());
        }

        let compiled: Vec<Regex> = filters
            .iter()
            .map(|f| {
                compile_glob(f, false).map_err(|e| {
                    cordon_core::ValidationError::InvalidArgument {
                        reason: format!("bad watch filter {f:?}: {e}"),
                    }
                })
            })
            .collect::<Result<_, _>>()?;

        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&id) {
            return Err(OperationError::SessionExists { id: id.to_string() }.into());
        }
        if sessions.len() >= MAX_SESSIONS {
            return Err(OperationError::WatchFailed {
                error: format!("session cap of {MAX_SESSIONS} reached"),
            }
            .into());
        }

        let buffer = Arc::new(Mutex::new(Vec::new()));
        let producer = Arc::clone(&buffer);
        let mut watcher = RecommendedWatcher::new(
            move |result: notify::Result<notify::Event>| match result {
                Ok(event) => buffer_events(&producer, &compiled, &event),
                Err(e) => warn!(error = %e, "watch facility error"),
            },
            notify::Config::default(),
        )
        .map_err(|e| OperationError::WatchFailed {
            error: e.to_string(),
        })?;

        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher
            .watch(&root, mode)
            .map_err(|e| OperationError::WatchFailed {
                error: e.to_string(),
            })?;

        info!(session = %id, dir = %root.display(), recursive, "watch session started");
        sessions.insert(
            id,
            WatchSession {
                _watcher: watcher,
                buffer,
            },
        );
        Ok(())
    }

    /// Snapshot the session's buffered events without draining them.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::SessionNotFound`].
    pub async fn get_events(&self, id: WatchId) -> CordonResult<Vec<FsEvent>> {
        let sessions = self.sessions.read().await;
        let session = sessions
            .get(&id)
            .ok_or_else(|| OperationError::SessionNotFound { id: id.to_string() })?;
        let buffer = session
            .buffer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(buffer.clone())
    }

    /// Empty the session's buffer.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::SessionNotFound`].
    pub async fn clear_events(&self, id: WatchId) -> CordonResult<()> {
        let sessions = self.sessions.read().await;
        let session = sessions
            .get(&id)
            .ok_or_else(|| OperationError::SessionNotFound { id: id.to_string() })?;
        session
            .buffer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
        Ok(())
    }

    /// Stop the session, releasing the watcher and its buffer.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::SessionNotFound`].
    pub async fn stop(&self, id: WatchId) -> CordonResult<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.remove(&id).is_none() {
            return Err(OperationError::SessionNotFound { id: id.to_string() }.into());
        }
        info!(session = %id, "watch session stopped");
        Ok(())
    }

    /// Stop every live session.
    pub async fn stop_all(&self) {
        let mut sessions = self.sessions.write().await;
        let count = sessions.len();
        sessions.clear();
        if count > 0 {
            info!(count, "stopped all watch sessions");
        }
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Runs on the watcher callback thread: classify, filter, buffer.
fn buffer_events(buffer: &Mutex<Vec<FsEvent>>, filters: &[Regex], event: &notify::Event) {
    for fs_event in classify(event) {
        if !filters.is_empty() && !filters.iter().any(|re| re.is_match(&fs_event.path)) {
            continue;
        }
        let mut guard = buffer.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if guard.len() >= MAX_BUFFERED_EVENTS {
            warn!(path = %fs_event.path, "event buffer full, dropping event");
            continue;
        }
        debug!(path = %fs_event.path, kind = ?fs_event.kind, "event buffered");
        guard.push(fs_event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::FsEventKind;
    use cordon_audit::AuditLog;
    use cordon_config::ServiceConfig;
    use cordon_policy::PolicyConfig;
    use std::time::Duration;
    use tempfile::TempDir;

    fn registry() -> (TempDir, WatchRegistry) {
        let dir = TempDir::new().unwrap();
        let service = ServiceConfig::with_root(dir.path().canonicalize().unwrap());
        let policy = PolicyConfig::from_service(&service).unwrap();
        let engine = Arc::new(PolicyEngine::new(policy, AuditLog::disabled()));
        (dir, WatchRegistry::new(engine))
    }

    /// Watch facilities deliver within a few hundred milliseconds; poll up
    /// to two seconds before giving up.
    async fn wait_for_events(
        registry: &WatchRegistry,
        id: WatchId,
        predicate: impl Fn(&[FsEvent]) -> bool,
    ) -> Vec<FsEvent> {
        for _ in 0..40 {
            let events = registry.get_events(id).await.unwrap();
            if predicate(&events) {
                return events;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        registry.get_events(id).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_event_is_buffered() {
        let (dir, registry) = registry();
        let root = dir.path().canonicalize().unwrap();
        let agent = AgentId::new("a1");
        let id = WatchId::new();

        registry.watch(&agent, id, ".", true, &[]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::write(root.join("fresh.txt"), b"hello").unwrap();

        let events = wait_for_events(&registry, id, |evs| {
            evs.iter().any(|e| e.path.ends_with("fresh.txt"))
        })
        .await;
        assert!(events
            .iter()
            .any(|e| e.path.ends_with("fresh.txt")
                && matches!(e.kind, FsEventKind::Create | FsEventKind::Modify)));
    }

    #[tokio::test]
    async fn test_snapshot_does_not_drain_but_clear_does() {
        let (dir, registry) = registry();
        let root = dir.path().canonicalize().unwrap();
        let agent = AgentId::new("a1");
        let id = WatchId::new();

        registry.watch(&agent, id, ".", true, &[]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::write(root.join("x.txt"), b"x").unwrap();

        let first = wait_for_events(&registry, id, |evs| !evs.is_empty()).await;
        assert!(!first.is_empty());
        let second = registry.get_events(id).await.unwrap();
        assert_eq!(first.len(), second.len());

        registry.clear_events(id).await.unwrap();
        assert!(registry.get_events(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_filters_restrict_buffering() {
        let (dir, registry) = registry();
        let root = dir.path().canonicalize().unwrap();
        let agent = AgentId::new("a1");
        let id = WatchId::new();

        registry
            .watch(&agent, id, ".", true, &["*.rs".to_owned()])
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::write(root.join("keep.rs"), b"fn main() {}").unwrap();
        std::fs::write(root.join("drop.txt"), b"nope").unwrap();

        let events = wait_for_events(&registry, id, |evs| {
            evs.iter().any(|e| e.path.ends_with("keep.rs"))
        })
        .await;
        assert!(events.iter().all(|e| !e.path.ends_with("drop.txt")));
    }

    #[tokio::test]
    async fn test_duplicate_session_id_rejected() {
        let (_dir, registry) = registry();
        let agent = AgentId::new("a1");
        let id = WatchId::new();

        registry.watch(&agent, id, ".", false, &[]).await.unwrap();
        let err = registry.watch(&agent, id, ".", false, &[]).await.unwrap_err();
        assert!(matches!(
            err,
            cordon_core::CordonError::Operation(OperationError::SessionExists { .. })
        ));
    }

    #[tokio::test]
    async fn test_stop_discards_session() {
        let (_dir, registry) = registry();
        let agent = AgentId::new("a1");
        let id = WatchId::new();

        registry.watch(&agent, id, ".", false, &[]).await.unwrap();
        assert_eq!(registry.session_count().await, 1);

        registry.stop(id).await.unwrap();
        assert_eq!(registry.session_count().await, 0);
        let err = registry.get_events(id).await.unwrap_err();
        assert!(matches!(
            err,
            cordon_core::CordonError::Operation(OperationError::SessionNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_stop_all() {
        let (_dir, registry) = registry();
        let agent = AgentId::new("a1");

        registry
            .watch(&agent, WatchId::new(), ".", false, &[])
            .await
            .unwrap();
        registry
            .watch(&agent, WatchId::new(), ".", false, &[])
            .await
            .unwrap();
        assert_eq!(registry.session_count().await, 2);

        registry.stop_all().await;
        assert_eq!(registry.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_missing_directory_rejected() {
        let (_dir, registry) = registry();
        let agent = AgentId::new("a1");
        let err = registry
            .watch(&agent, WatchId::new(), "nope", false, &[])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            cordon_core::CordonError::Fs(FsOpError::NotFound { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_rename_delivered_as_pair_or_rename() {
        let (dir, registry) = registry();
        let root = dir.path().canonicalize().unwrap();
        std::fs::write(root.join("before.txt"), b"x").unwrap();

        let agent = AgentId::new("a1");
        let id = WatchId::new();
        registry.watch(&agent, id, ".", true, &[]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        std::fs::rename(root.join("before.txt"), root.join("after.txt")).unwrap();

        let events = wait_for_events(&registry, id, |evs| {
            evs.iter().any(|e| e.path.ends_with("after.txt"))
        })
        .await;

        let paired = events.iter().any(|e| {
            e.kind == FsEventKind::Rename
                && e.old_path.as_deref().is_some_and(|p| p.ends_with("before.txt"))
        });
        let split = events.iter().any(|e| {
            e.path.ends_with("after.txt")
                && matches!(e.kind, FsEventKind::Create | FsEventKind::Rename)
        });
        assert!(paired || split, "rename must surface one way or the other");
    }
}
