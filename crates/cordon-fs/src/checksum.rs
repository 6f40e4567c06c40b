//! Streamed checksums with modified-during-read detection.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use cordon_core::{
    AgentId, CordonError, CordonResult, FsOpError, OperationError, OperationKind, ValidationError,
};
use cordon_policy::PolicyEngine;
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

/// Read chunk size for hash streaming.
const CHUNK_SIZE: usize = 64 * 1024;

/// Supported checksum algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    /// MD5 (legacy; verification compatibility only).
    Md5,
    /// SHA-1.
    Sha1,
    /// SHA-256.
    Sha256,
    /// SHA-512.
    Sha512,
}

impl ChecksumAlgorithm {
    /// Parse an algorithm name as it appears on the wire.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnsupportedAlgorithm`] for anything else.
    pub fn parse(name: &str) -> Result<Self, ValidationError> {
        match name.to_ascii_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha1" | "sha-1" => Ok(Self::Sha1),
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "sha512" | "sha-512" => Ok(Self::Sha512),
            _ => Err(ValidationError::UnsupportedAlgorithm {
                algorithm: name.to_owned(),
            }),
        }
    }
}

impl std::fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Md5 => write!(f, "md5"),
            Self::Sha1 => write!(f, "sha1"),
            Self::Sha256 => write!(f, "sha256"),
            Self::Sha512 => write!(f, "sha512"),
        }
    }
}

/// Outcome of a checksum verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecksumVerification {
    /// Whether the digests matched (case-insensitive hex comparison).
    #[serde(rename = "match")]
    pub matches: bool,
    /// The digest the caller expected.
    pub expected: String,
    /// The digest actually computed.
    pub actual: String,
}

/// Checksum compute/verify over vetted paths.
#[derive(Debug)]
pub struct ChecksumOps {
    engine: Arc<PolicyEngine>,
}

impl ChecksumOps {
    /// Create checksum operations bound to a policy engine.
    #[must_use]
    pub fn new(engine: Arc<PolicyEngine>) -> Self {
        Self { engine }
    }

    /// Stream the file and return its hex digest.
    ///
    /// The file's mtime is captured before reading and compared after; a
    /// change rejects the result rather than returning a digest of
    /// ambiguous content.
    ///
    /// # Errors
    ///
    /// Security rejections, the per-file size cap,
    /// [`OperationError::FileModified`], or filesystem errors.
    pub async fn compute(
        &self,
        agent: &AgentId,
        path: &str,
        algorithm: ChecksumAlgorithm,
    ) -> CordonResult<String> {
        let vetted = self.engine.vet(path, OperationKind::Read, agent)?;
        let path = vetted.into_path_buf();

        let size = std::fs::metadata(&path)
            .map_err(|e| FsOpError::classify(&path, e))?
            .len();
        self.engine.guard_file_size(size, agent)?;

        tokio::task::spawn_blocking(move || compute_sync(&path, algorithm))
            .await
            .map_err(|e| {
                CordonError::Fs(FsOpError::Io(std::io::Error::other(format!(
                    "hash task failed: {e}"
                ))))
            })?
    }

    /// Compute and compare against an expected digest.
    ///
    /// # Errors
    ///
    /// Same as [`compute`](Self::compute); a mismatch is a normal result,
    /// not an error.
    pub async fn verify(
        &self,
        agent: &AgentId,
        path: &str,
        expected: &str,
        algorithm: ChecksumAlgorithm,
    ) -> CordonResult<ChecksumVerification> {
        let actual = self.compute(agent, path, algorithm).await?;
        Ok(ChecksumVerification {
            matches: actual.eq_ignore_ascii_case(expected),
            expected: expected.to_owned(),
            actual,
        })
    }
}

fn compute_sync(path: &Path, algorithm: ChecksumAlgorithm) -> CordonResult<String> {
    let initial_mtime = mtime_of(path)?;

    let file = std::fs::File::open(path).map_err(|e| FsOpError::classify(path, e))?;
    let digest = match algorithm {
        ChecksumAlgorithm::Md5 => hash_reader::<Md5>(file, path)?,
        ChecksumAlgorithm::Sha1 => hash_reader::<Sha1>(file, path)?,
        ChecksumAlgorithm::Sha256 => hash_reader::<Sha256>(file, path)?,
        ChecksumAlgorithm::Sha512 => hash_reader::<Sha512>(file, path)?,
    };

    let final_mtime = mtime_of(path)?;
    if initial_mtime != final_mtime {
        return Err(OperationError::FileModified {
            path: path.to_path_buf(),
        }
        .into());
    }
    Ok(digest)
}

fn mtime_of(path: &Path) -> CordonResult<SystemTime> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| FsOpError::classify(path, e).into())
}

fn hash_reader<D: Digest>(mut reader: std::fs::File, path: &Path) -> CordonResult<String> {
    let mut hasher = D::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let read = reader
            .read(&mut buffer)
            .map_err(|e| FsOpError::classify(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::engine;

    #[tokio::test]
    async fn test_empty_file_sha256() {
        let (dir, engine) = engine();
        let root = dir.path().canonicalize().unwrap();
        std::fs::write(root.join("empty"), b"").unwrap();

        let ops = ChecksumOps::new(engine);
        let agent = AgentId::new("a1");
        let digest = ops
            .compute(&agent, "empty", ChecksumAlgorithm::Sha256)
            .await
            .unwrap();
        assert_eq!(
            digest,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[tokio::test]
    async fn test_known_digests() {
        let (dir, engine) = engine();
        let root = dir.path().canonicalize().unwrap();
        std::fs::write(root.join("abc"), b"abc").unwrap();

        let ops = ChecksumOps::new(engine);
        let agent = AgentId::new("a1");

        let md5 = ops
            .compute(&agent, "abc", ChecksumAlgorithm::Md5)
            .await
            .unwrap();
        assert_eq!(md5, "900150983cd24fb0d6963f7d28e17f72");

        let sha1 = ops
            .compute(&agent, "abc", ChecksumAlgorithm::Sha1)
            .await
            .unwrap();
        assert_eq!(sha1, "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[tokio::test]
    async fn test_verify_roundtrip_all_algorithms() {
        let (dir, engine) = engine();
        let root = dir.path().canonicalize().unwrap();
        std::fs::write(root.join("data.bin"), b"cordon checksum test").unwrap();

        let ops = ChecksumOps::new(engine);
        let agent = AgentId::new("a1");

        for algorithm in [
            ChecksumAlgorithm::Md5,
            ChecksumAlgorithm::Sha1,
            ChecksumAlgorithm::Sha256,
            ChecksumAlgorithm::Sha512,
        ] {
            let digest = ops.compute(&agent, "data.bin", algorithm).await.unwrap();
            let verification = ops
                .verify(&agent, "data.bin", &digest.to_uppercase(), algorithm)
                .await
                .unwrap();
            assert!(verification.matches, "{algorithm} digest should verify");
        }
    }

    #[tokio::test]
    async fn test_verify_mismatch_is_reported_not_errored() {
        let (dir, engine) = engine();
        let root = dir.path().canonicalize().unwrap();
        std::fs::write(root.join("f"), b"content").unwrap();

        let ops = ChecksumOps::new(engine);
        let agent = AgentId::new("a1");
        let verification = ops
            .verify(&agent, "f", "deadbeef", ChecksumAlgorithm::Sha256)
            .await
            .unwrap();
        assert!(!verification.matches);
        assert_eq!(verification.expected, "deadbeef");
    }

    #[tokio::test]
    async fn test_missing_file_is_fs_error() {
        let (_dir, engine) = engine();
        let ops = ChecksumOps::new(engine);
        let agent = AgentId::new("a1");
        let err = ops
            .compute(&agent, "ghost", ChecksumAlgorithm::Sha256)
            .await
            .unwrap_err();
        assert!(matches!(err, CordonError::Fs(FsOpError::NotFound { .. })));
    }

    #[test]
    fn test_algorithm_parsing() {
        assert_eq!(
            ChecksumAlgorithm::parse("SHA-256").unwrap(),
            ChecksumAlgorithm::Sha256
        );
        assert_eq!(
            ChecksumAlgorithm::parse("md5").unwrap(),
            ChecksumAlgorithm::Md5
        );
        assert!(matches!(
            ChecksumAlgorithm::parse("crc32"),
            Err(ValidationError::UnsupportedAlgorithm { .. })
        ));
    }
}
