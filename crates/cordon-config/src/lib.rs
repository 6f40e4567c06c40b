//! Cordon Config - service configuration document.
//!
//! The service is configured by a single JSON document naming the workspace
//! root and the policy knobs layered on top of it. Loading follows a fixed
//! sequence: parse, apply defaults, validate, canonicalize.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod loader;
mod types;
mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load, load_from_str, CONFIG_ENV_VAR};
pub use types::ServiceConfig;
pub use validate::validate;
