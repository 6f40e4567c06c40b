//! Cordon Search - file search over the workspace, with an optional
//! in-memory metadata index.
//!
//! Name and metadata filtering are implemented here; substring content
//! matching sits behind the [`ContentSearcher`] trait so the engine can be
//! swapped (the default compiles the query into a case-insensitive
//! regex).

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod index;
mod ops;
mod searcher;

pub use index::{IndexStats, SearchIndex};
pub use ops::{SearchHit, SearchOps, SearchQuery, SearchType};
pub use searcher::{ContentSearcher, RegexSearcher};
