//! Wire response shapes.

use cordon_core::{CordonError, WatchId};
use cordon_fs::{BatchOpResult, ChecksumVerification, CopyStats, SyncStats, UsageReport};
use cordon_search::{IndexStats, SearchHit};
use cordon_watch::FsEvent;
use serde::Serialize;

/// Success payload, one shape per operation.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ResponseBody {
    /// Per-op batch outcomes.
    Batch {
        /// One result per submitted op, in order.
        results: Vec<BatchOpResult>,
    },
    /// A new watch session.
    Watch {
        /// The opaque session id.
        session_id: WatchId,
    },
    /// Buffered watch events.
    Events {
        /// Snapshot, oldest first.
        events: Vec<FsEvent>,
    },
    /// Search hits.
    Search {
        /// Matching files, path-sorted.
        files: Vec<SearchHit>,
    },
    /// Index build statistics.
    Index(IndexStats),
    /// A computed digest.
    Checksum {
        /// Lowercase hex digest.
        digest: String,
    },
    /// A verification outcome.
    Verification(ChecksumVerification),
    /// A disk usage report.
    Usage(Box<UsageReport>),
    /// Copy statistics.
    Copy(CopyStats),
    /// Sync statistics.
    Sync(SyncStats),
    /// Plain acknowledgement.
    Ack {},
}

/// One wire response.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    /// The operation succeeded.
    Ok {
        /// The operation's payload.
        result: ResponseBody,
    },
    /// The operation was rejected or failed.
    Error {
        /// Stable boundary code (`SEC-*`, `VAL-*`, `FS-*`, `OP-*`).
        code: String,
        /// Canonical message.
        message: String,
    },
}

impl Response {
    /// Wrap a success payload.
    #[must_use]
    pub fn ok(result: ResponseBody) -> Self {
        Self::Ok { result }
    }

    /// Whether this is a success response.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }
}

impl From<&CordonError> for Response {
    fn from(error: &CordonError) -> Self {
        Self::Error {
            code: error.code().to_owned(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_shape() {
        let response = Response::ok(ResponseBody::Checksum {
            digest: "abc123".to_owned(),
        });
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&response).unwrap()).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["result"]["digest"], "abc123");
    }

    #[test]
    fn test_error_shape_carries_code() {
        let err: CordonError = cordon_core::SecurityError::EmergencyStop.into();
        let response = Response::from(&err);
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&response).unwrap()).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["code"], "SEC-011");
        assert!(json["message"].as_str().unwrap().contains("emergency"));
    }
}
