//! Cordon FS - the effectful side of the service.
//!
//! Every operation here consumes paths vetted by the policy engine and
//! performs its blocking filesystem work on the tokio blocking pool.
//! Components hold an `Arc<PolicyEngine>`; nothing in this crate reaches
//! the filesystem around it.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod batch;
mod checksum;
mod dirops;
mod symlink;
mod usage;

pub use batch::{BatchExecutor, BatchOp, BatchOpKind, BatchOpResult};
pub use checksum::{ChecksumAlgorithm, ChecksumOps, ChecksumVerification};
pub use dirops::{CopyStats, DirectoryOps, SyncStats};
pub use symlink::SymlinkOps;
pub use usage::{DiskUsageOps, LargestEntry, UsageReport};

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use cordon_audit::AuditLog;
    use cordon_config::ServiceConfig;
    use cordon_policy::{PolicyConfig, PolicyEngine};
    use tempfile::TempDir;

    /// An engine confined to a fresh temp workspace.
    pub(crate) fn engine() -> (TempDir, Arc<PolicyEngine>) {
        let dir = TempDir::new().expect("tempdir");
        let service = ServiceConfig::with_root(dir.path().canonicalize().expect("canonicalize"));
        let policy = PolicyConfig::from_service(&service).expect("policy");
        let engine = Arc::new(PolicyEngine::new(policy, AuditLog::disabled()));
        (dir, engine)
    }
}
