//! Cordon Core - Foundation types for the cordon sandboxed filesystem service.
//!
//! This crate provides:
//! - Typed identifiers for agents and watch sessions
//! - The operation-kind classification every path is vetted against
//! - The boundary error taxonomy (security / validation / filesystem / operation)
//! - Common types used throughout the service

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod types;

pub use error::{
    CordonError, CordonResult, FsOpError, OperationError, SecurityError, ValidationError,
};
pub use types::{AgentId, OperationKind, Timestamp, WatchId};
