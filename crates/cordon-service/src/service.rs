//! The service facade wiring policy, effects, watching, and search.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cordon_audit::AuditLog;
use cordon_config::ServiceConfig;
use cordon_core::{AgentId, CordonError, CordonResult, ValidationError, WatchId};
use cordon_fs::{
    BatchExecutor, ChecksumAlgorithm, ChecksumOps, DirectoryOps, DiskUsageOps, SymlinkOps,
};
use cordon_policy::{PolicyBuildError, PolicyConfig, PolicyEngine};
use cordon_search::SearchOps;
use cordon_watch::WatchRegistry;
use thiserror::Error;
use tracing::{debug, info};

use crate::request::Request;
use crate::response::{Response, ResponseBody};

/// Errors raised while assembling the service.
#[derive(Debug, Error)]
pub enum ServiceBuildError {
    /// Policy compilation failed.
    #[error(transparent)]
    Policy(#[from] PolicyBuildError),

    /// The audit file could not be opened.
    #[error("cannot open audit log: {0}")]
    Audit(#[from] cordon_audit::AuditError),
}

/// Monotonic service counters.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct ServiceStats {
    /// Requests that completed successfully.
    pub served: u64,
    /// Requests rejected or failed.
    pub rejected: u64,
}

/// The sandboxed filesystem service.
pub struct FsService {
    engine: Arc<PolicyEngine>,
    batches: BatchExecutor,
    directories: DirectoryOps,
    checksums: ChecksumOps,
    usage: DiskUsageOps,
    symlinks: SymlinkOps,
    watches: WatchRegistry,
    search: SearchOps,
    served: AtomicU64,
    rejected: AtomicU64,
}

impl FsService {
    /// Assemble the service from a validated configuration.
    ///
    /// Must be called within a tokio runtime (the audit writer task is
    /// spawned here).
    ///
    /// # Errors
    ///
    /// Returns [`ServiceBuildError`] if policy compilation or the audit
    /// sink fail.
    pub fn new(config: &ServiceConfig) -> Result<Self, ServiceBuildError> {
        let audit = if !config.enable_audit_log {
            AuditLog::disabled()
        } else if let Some(path) = &config.audit_log_file {
            AuditLog::to_file(path)?
        } else {
            AuditLog::stderr()
        };

        let policy = PolicyConfig::from_service(config)?;
        let engine = Arc::new(PolicyEngine::new(policy, audit));
        info!(
            workspace_root = %engine.workspace_root().display(),
            read_only = config.read_only,
            "service assembled"
        );
        Ok(Self::from_engine(engine))
    }

    /// Assemble the service around an existing engine (tests, embedders).
    #[must_use]
    pub fn from_engine(engine: Arc<PolicyEngine>) -> Self {
        Self {
            batches: BatchExecutor::new(Arc::clone(&engine)),
            directories: DirectoryOps::new(Arc::clone(&engine)),
            checksums: ChecksumOps::new(Arc::clone(&engine)),
            usage: DiskUsageOps::new(Arc::clone(&engine)),
            symlinks: SymlinkOps::new(Arc::clone(&engine)),
            watches: WatchRegistry::new(Arc::clone(&engine)),
            search: SearchOps::new(Arc::clone(&engine)),
            engine,
            served: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// The policy engine (administrative surface: emergency flags).
    #[must_use]
    pub fn engine(&self) -> &Arc<PolicyEngine> {
        &self.engine
    }

    /// Service counters.
    #[must_use]
    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            served: self.served.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }

    /// Handle one request for one agent.
    ///
    /// Every outcome produces exactly one audit line and one response;
    /// errors are encoded, never panicked.
    pub async fn handle(&self, agent: &AgentId, request: Request) -> Response {
        let operation = request.operation();
        let paths = request.paths();
        debug!(agent = %agent, operation, "request received");

        match self.dispatch(agent, request).await {
            Ok(body) => {
                self.served.fetch_add(1, Ordering::Relaxed);
                self.engine.note(operation, paths, Ok(()), agent);
                Response::ok(body)
            },
            Err(error) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                // Security rejections already produced their violation
                // record; everything else gets an operation failure line.
                if !matches!(error, CordonError::Security(_)) {
                    self.engine
                        .note(operation, paths, Err(error.to_string()), agent);
                }
                Response::from(&error)
            },
        }
    }

    async fn dispatch(&self, agent: &AgentId, request: Request) -> CordonResult<ResponseBody> {
        self.engine.admit(agent, request.operation())?;

        match request {
            Request::BatchOperations { operations, atomic } => {
                let results = self.batches.execute_batch(agent, operations, atomic).await?;
                Ok(ResponseBody::Batch { results })
            },
            Request::WatchDirectory {
                path,
                recursive,
                filters,
            } => {
                let session_id = WatchId::new();
                self.watches
                    .watch(agent, session_id, &path, recursive, &filters)
                    .await?;
                Ok(ResponseBody::Watch { session_id })
            },
            Request::GetWatchEvents { session_id, clear } => {
                let id = parse_session(&session_id)?;
                let events = self.watches.get_events(id).await?;
                if clear {
                    self.watches.clear_events(id).await?;
                }
                Ok(ResponseBody::Events { events })
            },
            Request::StopWatch { session_id } => {
                let id = parse_session(&session_id)?;
                self.watches.stop(id).await?;
                Ok(ResponseBody::Ack {})
            },
            Request::SearchFiles { query } => {
                let files = self.search.search_files(agent, &query).await?;
                Ok(ResponseBody::Search { files })
            },
            Request::BuildIndex {
                path,
                include_content,
            } => {
                let stats = self.search.build_index(agent, &path, include_content).await?;
                Ok(ResponseBody::Index(stats))
            },
            Request::CreateSymlink {
                link_path,
                target_path,
            } => {
                self.symlinks.create(agent, &link_path, &target_path).await?;
                Ok(ResponseBody::Ack {})
            },
            Request::ComputeChecksum { path, algorithm } => {
                let algorithm = ChecksumAlgorithm::parse(&algorithm)?;
                let digest = self.checksums.compute(agent, &path, algorithm).await?;
                Ok(ResponseBody::Checksum { digest })
            },
            Request::VerifyChecksum {
                path,
                expected,
                algorithm,
            } => {
                let algorithm = ChecksumAlgorithm::parse(&algorithm)?;
                let verification = self
                    .checksums
                    .verify(agent, &path, &expected, algorithm)
                    .await?;
                Ok(ResponseBody::Verification(verification))
            },
            Request::AnalyzeDiskUsage {
                path,
                depth,
                group_by_type,
            } => {
                let report = self.usage.analyze(agent, &path, depth, group_by_type).await?;
                Ok(ResponseBody::Usage(Box::new(report)))
            },
            Request::CopyDirectory {
                source,
                destination,
                preserve_metadata,
                exclusions,
            } => {
                let stats = self
                    .directories
                    .copy_directory(agent, &source, &destination, preserve_metadata, &exclusions)
                    .await?;
                Ok(ResponseBody::Copy(stats))
            },
            Request::SyncDirectory {
                source,
                destination,
                exclusions,
            } => {
                let stats = self
                    .directories
                    .sync_directory(agent, &source, &destination, &exclusions)
                    .await?;
                Ok(ResponseBody::Sync(stats))
            },
        }
    }

    /// Stop every watch session and flush the audit stream.
    pub async fn shutdown(&self) {
        self.watches.stop_all().await;
        self.engine.audit().flush().await;
        info!("service shut down");
    }
}

fn parse_session(raw: &str) -> Result<WatchId, CordonError> {
    WatchId::parse(raw).map_err(|_| {
        ValidationError::InvalidArgument {
            reason: format!("malformed session id: {raw}"),
        }
        .into()
    })
}
