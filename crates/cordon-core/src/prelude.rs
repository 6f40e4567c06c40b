//! Convenience re-exports for downstream crates.

pub use crate::error::{
    CordonError, CordonResult, FsOpError, OperationError, SecurityError, ValidationError,
};
pub use crate::types::{AgentId, OperationKind, Timestamp, WatchId};
