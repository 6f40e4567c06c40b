//! The policy engine facade.
//!
//! Every effectful component holds a reference to the engine and goes
//! through `vet` / `guard_*` / `note`; nothing else touches the resolver
//! or the rate limiter. The engine also owns the two emergency flags and
//! emits the audit stream.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use cordon_audit::{AuditLog, AuditRecord, ViolationRecord};
use cordon_core::{AgentId, OperationKind, SecurityError, Timestamp, ValidationError};
use tracing::{debug, warn};

use crate::config::{PolicyConfig, VettedPath};
use crate::rate::RateLimiter;
use crate::resolver::{resolve, Rejection};

/// Orchestrates path vetting, rate limiting, and audit emission.
#[derive(Debug)]
pub struct PolicyEngine {
    config: PolicyConfig,
    limiter: RateLimiter,
    audit: AuditLog,
    emergency_stop: AtomicBool,
    emergency_read_only: AtomicBool,
}

impl PolicyEngine {
    /// Build an engine over compiled policy and an audit handle.
    #[must_use]
    pub fn new(config: PolicyConfig, audit: AuditLog) -> Self {
        let limiter = RateLimiter::new(&config);
        Self {
            config,
            limiter,
            audit,
            emergency_stop: AtomicBool::new(false),
            emergency_read_only: AtomicBool::new(false),
        }
    }

    /// The workspace root this engine confines operations to.
    #[must_use]
    pub fn workspace_root(&self) -> &Path {
        self.config.workspace_root()
    }

    /// The compiled policy.
    #[must_use]
    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Admit one operation for an agent: emergency flags, then the
    /// sliding-window budget (recorded on success).
    ///
    /// # Errors
    ///
    /// Returns the security rejection; a violation record has already been
    /// emitted.
    pub fn admit(&self, agent: &AgentId, operation: &str) -> Result<(), SecurityError> {
        if let Err(e) = self.emergency_gate(OperationKind::Read) {
            self.violation(&e, operation, None);
            return Err(e);
        }

        let now = Timestamp::now();
        if let Err(e) = self.limiter.check(agent, now) {
            self.violation(&e, operation, None);
            return Err(e);
        }
        self.limiter.record(agent, now);
        debug!(agent = %agent, operation, "operation admitted");
        Ok(())
    }

    /// Vet one untrusted path argument for an operation kind.
    ///
    /// # Errors
    ///
    /// Returns the rejection of the first failing pipeline layer; a
    /// violation record has already been emitted.
    pub fn vet(
        &self,
        input: &str,
        kind: OperationKind,
        agent: &AgentId,
    ) -> Result<VettedPath, SecurityError> {
        if let Err(e) = self.emergency_gate(kind) {
            self.violation(&e, input, None);
            return Err(e);
        }

        match resolve(input, kind, &self.config) {
            Ok(vetted) => Ok(vetted),
            Err(rejection) => {
                let Rejection {
                    error,
                    input,
                    resolved,
                } = rejection;
                warn!(
                    agent = %agent,
                    input = %input,
                    violation = error.violation_tag(),
                    "path rejected"
                );
                self.violation(&error, &input, resolved.as_deref());
                Err(error)
            },
        }
    }

    /// Vet a symlink creation: the link path as a write, the target as a
    /// read. Any target rejection surfaces as a symlink escape.
    ///
    /// # Errors
    ///
    /// Returns the security rejection; a violation record has already been
    /// emitted.
    pub fn vet_symlink(
        &self,
        link: &str,
        target: &str,
        agent: &AgentId,
    ) -> Result<(VettedPath, PathBuf), SecurityError> {
        let vetted_link = self.vet(link, OperationKind::Write, agent)?;

        if let Err(e) = self.emergency_gate(OperationKind::Read) {
            self.violation(&e, target, None);
            return Err(e);
        }
        match resolve(target, OperationKind::Read, &self.config) {
            Ok(vetted_target) => Ok((vetted_link, vetted_target.into_path_buf())),
            Err(rejection) => {
                let error = SecurityError::SymlinkEscape {
                    link: vetted_link.as_path().to_path_buf(),
                    target: target.to_owned(),
                };
                warn!(
                    agent = %agent,
                    link,
                    target,
                    inner = rejection.error.violation_tag(),
                    "symlink target rejected"
                );
                self.violation(&error, target, rejection.resolved.as_deref());
                Err(error)
            },
        }
    }

    /// Reject a single file larger than the configured cap.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::FileSizeExceeded`].
    pub fn guard_file_size(&self, size: u64, agent: &AgentId) -> Result<(), ValidationError> {
        let result = self.limiter.guard_file_size(size);
        if let Err(e) = &result {
            debug!(agent = %agent, error = %e, "file size guard rejected");
        }
        result
    }

    /// Reject a batch whose byte total or op count exceed the caps.
    ///
    /// # Errors
    ///
    /// Returns the corresponding [`ValidationError`].
    pub fn guard_batch(
        &self,
        total_bytes: u64,
        op_count: usize,
        agent: &AgentId,
    ) -> Result<(), ValidationError> {
        let result = self.limiter.guard_batch(total_bytes, op_count);
        if let Err(e) = &result {
            debug!(agent = %agent, error = %e, "batch guard rejected");
        }
        result
    }

    /// Record one operation outcome on the audit stream.
    pub fn note(
        &self,
        operation: &str,
        paths: Vec<String>,
        result: Result<(), String>,
        agent: &AgentId,
    ) {
        debug!(agent = %agent, operation, ok = result.is_ok(), "operation noted");
        match result {
            Ok(()) => self.audit.record(AuditRecord::success(operation, paths)),
            Err(error) => self
                .audit
                .record(AuditRecord::failure(operation, paths, error)),
        }
    }

    /// Engage or release the emergency stop.
    pub fn set_emergency_stop(&self, engaged: bool) {
        self.emergency_stop.store(engaged, Ordering::SeqCst);
        warn!(engaged, "emergency stop toggled");
    }

    /// Engage or release emergency read-only mode.
    pub fn set_emergency_read_only(&self, engaged: bool) {
        self.emergency_read_only.store(engaged, Ordering::SeqCst);
        warn!(engaged, "emergency read-only toggled");
    }

    /// Whether the emergency stop is engaged.
    #[must_use]
    pub fn emergency_stopped(&self) -> bool {
        self.emergency_stop.load(Ordering::SeqCst)
    }

    /// The audit handle, for components that flush in tests.
    #[must_use]
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    fn emergency_gate(&self, kind: OperationKind) -> Result<(), SecurityError> {
        if self.emergency_stop.load(Ordering::SeqCst) {
            return Err(SecurityError::EmergencyStop);
        }
        if kind.is_mutating() && self.emergency_read_only.load(Ordering::SeqCst) {
            return Err(SecurityError::EmergencyReadOnly { kind });
        }
        Ok(())
    }

    fn violation(&self, error: &SecurityError, input: &str, resolved: Option<&Path>) {
        self.audit.record(ViolationRecord::new(
            error.violation_tag(),
            input,
            resolved.map(|p| p.display().to_string()),
            self.config.workspace_root().display().to_string(),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cordon_config::ServiceConfig;
    use tempfile::TempDir;

    fn engine_in(dir: &TempDir, audit: AuditLog) -> PolicyEngine {
        let service = ServiceConfig::with_root(dir.path().canonicalize().unwrap());
        let policy = PolicyConfig::from_service(&service).unwrap();
        PolicyEngine::new(policy, audit)
    }

    #[test]
    fn test_vet_produces_workspace_paths() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir, AuditLog::disabled());
        let agent = AgentId::new("a1");

        let vetted = engine
            .vet("notes/today.md", OperationKind::Write, &agent)
            .unwrap();
        assert!(vetted.as_path().starts_with(engine.workspace_root()));
    }

    #[test]
    fn test_emergency_stop_rejects_everything() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir, AuditLog::disabled());
        let agent = AgentId::new("a1");

        engine.set_emergency_stop(true);
        let err = engine.vet("x", OperationKind::Read, &agent).unwrap_err();
        assert!(matches!(err, SecurityError::EmergencyStop));
        assert!(engine.admit(&agent, "compute_checksum").is_err());

        engine.set_emergency_stop(false);
        assert!(engine.vet("x", OperationKind::Read, &agent).is_ok());
    }

    #[test]
    fn test_emergency_read_only_allows_reads() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir, AuditLog::disabled());
        let agent = AgentId::new("a1");

        engine.set_emergency_read_only(true);
        assert!(engine.vet("x", OperationKind::Read, &agent).is_ok());
        let err = engine.vet("x", OperationKind::Write, &agent).unwrap_err();
        assert!(matches!(err, SecurityError::EmergencyReadOnly { .. }));
    }

    #[tokio::test]
    async fn test_rejection_emits_violation_record() {
        let dir = TempDir::new().unwrap();
        let (audit, store) = AuditLog::in_memory();
        let engine = engine_in(&dir, audit);
        let agent = AgentId::new("a1");

        let _ = engine.vet("../etc/passwd", OperationKind::Read, &agent);
        engine.audit().flush().await;

        let lines = store.snapshot();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("\"path_traversal\""));
        assert!(lines[0].contains("../etc/passwd"));
    }

    #[tokio::test]
    async fn test_symlink_target_outside_workspace() {
        let dir = TempDir::new().unwrap();
        let (audit, store) = AuditLog::in_memory();
        let engine = engine_in(&dir, audit);
        let agent = AgentId::new("a1");

        let err = engine
            .vet_symlink("link", "/etc/passwd", &agent)
            .unwrap_err();
        assert!(matches!(err, SecurityError::SymlinkEscape { .. }));

        engine.audit().flush().await;
        let lines = store.snapshot();
        assert!(lines.iter().any(|l| l.contains("\"symlink_escape\"")));
    }

    #[test]
    fn test_admit_rate_limits() {
        let dir = TempDir::new().unwrap();
        let mut service = ServiceConfig::with_root(dir.path().canonicalize().unwrap());
        service.max_operations_per_minute = 2;
        let policy = PolicyConfig::from_service(&service).unwrap();
        let engine = PolicyEngine::new(policy, AuditLog::disabled());
        let agent = AgentId::new("busy");

        assert!(engine.admit(&agent, "search_files").is_ok());
        assert!(engine.admit(&agent, "search_files").is_ok());
        let err = engine.admit(&agent, "search_files").unwrap_err();
        assert!(matches!(err, SecurityError::RateLimit { .. }));
    }
}
