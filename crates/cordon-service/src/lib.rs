//! Cordon Service - the operation facade.
//!
//! Requests identify one of twelve operations; the facade admits the
//! agent through the rate limiter, lets each component vet its own paths
//! through the policy engine, and records one audit line per outcome.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod request;
mod response;
mod service;

pub use request::Request;
pub use response::{Response, ResponseBody};
pub use service::{FsService, ServiceBuildError, ServiceStats};
