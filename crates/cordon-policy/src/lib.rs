//! Cordon Policy - the security and consistency kernel.
//!
//! Everything that decides whether an untrusted path may be touched lives
//! here: the layered path validation pipeline, the per-agent rate limiter,
//! and the [`PolicyEngine`] facade that effectful components must go
//! through. No module outside this crate constructs a [`VettedPath`].
//!
//! The pipeline is fail-closed: ambiguous resolution, symlink chains past
//! the depth bound, and filesystem errors during symlink vetting all
//! reject.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod config;
mod engine;
mod glob;
mod rate;
mod resolver;

pub use config::{PolicyBuildError, PolicyConfig, VettedPath};
pub use engine::PolicyEngine;
pub use glob::{compile_glob, glob_to_regex};
pub use rate::RateLimiter;
pub use resolver::{resolve, Rejection};
