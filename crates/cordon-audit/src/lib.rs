//! Cordon Audit - the structured audit stream.
//!
//! Every policy decision produces exactly one line on the audit stream:
//! successes as `AUDIT` records, rejections as `SECURITY_VIOLATION` records,
//! one JSON object per line. Records flow through an unbounded channel to a
//! background writer so emission never blocks a request.
//!
//! # Example
//!
//! ```
//! use cordon_audit::{AuditLog, AuditRecord};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (log, store) = AuditLog::in_memory();
//! log.record(AuditRecord::success(
//!     "compute_checksum",
//!     vec!["/ws/a.txt".into()],
//! ));
//! log.flush().await;
//! assert_eq!(store.snapshot().len(), 1);
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod log;
mod record;
mod sink;

pub use error::{AuditError, AuditResult};
pub use log::AuditLog;
pub use record::{AuditLine, AuditRecord, ViolationRecord};
pub use sink::{AuditSink, FileSink, MemorySink, StderrSink};
