//! Cordon Watch - multiplexed directory watch sessions.
//!
//! Each session owns a platform watcher (via `notify`), a glob filter
//! set, and a buffer of classified events. The buffer has one producer
//! (the watcher callback thread) and one consumer (`get_events`);
//! `get_events` snapshots without draining, `clear_events` empties, and
//! `stop` releases the watcher and discards the buffer.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod event;
mod registry;

pub use event::{FsEvent, FsEventKind};
pub use registry::WatchRegistry;
