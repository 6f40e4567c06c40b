//! The in-memory metadata index.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use cordon_core::Timestamp;
use serde::{Deserialize, Serialize};

/// Files larger than this never have content captured into the index.
pub(crate) const MAX_INDEXED_CONTENT: u64 = 1024 * 1024;

/// One indexed file.
#[derive(Debug, Clone)]
pub(crate) struct IndexEntry {
    pub(crate) size: u64,
    pub(crate) modified: Timestamp,
    pub(crate) extension: Option<String>,
    /// Captured content, when indexing requested it and the file was small
    /// enough.
    pub(crate) content: Option<String>,
}

/// Statistics returned by an index build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    /// Files recorded in the index.
    pub files_indexed: u64,
    /// Sum of recorded file sizes.
    pub bytes_indexed: u64,
    /// Whether file contents were captured.
    pub content_included: bool,
    /// Wall-clock build duration.
    pub duration_ms: u64,
}

/// A point-in-time metadata snapshot of a workspace subtree.
#[derive(Debug, Default)]
pub struct SearchIndex {
    pub(crate) root: PathBuf,
    pub(crate) entries: HashMap<PathBuf, IndexEntry>,
}

impl SearchIndex {
    pub(crate) fn new(root: PathBuf) -> Self {
        Self {
            root,
            entries: HashMap::new(),
        }
    }

    /// Number of files in the index.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The subtree this index covers.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Captured content for a file, when the entry is still current
    /// (same size and mtime as on disk).
    pub(crate) fn current_content(&self, path: &Path) -> Option<&str> {
        let entry = self.entries.get(path)?;
        let content = entry.content.as_deref()?;
        let meta = std::fs::metadata(path).ok()?;
        let mtime = meta.modified().ok().map(Timestamp::from)?;
        (meta.len() == entry.size && mtime == entry.modified).then_some(content)
    }
}
