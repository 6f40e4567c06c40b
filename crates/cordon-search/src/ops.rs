//! Search and index operations.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use cordon_core::{AgentId, CordonError, CordonResult, FsOpError, OperationKind, Timestamp};
use cordon_policy::{resolve, PolicyEngine};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::index::{IndexEntry, IndexStats, SearchIndex, MAX_INDEXED_CONTENT};
use crate::searcher::{ContentSearcher, Matcher, RegexSearcher};

/// Which fields a search query matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    /// Match against file names.
    Name,
    /// Match against file contents.
    Content,
    /// Match either.
    Both,
}

/// A search request over the workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    /// The query string (matched as a case-insensitive substring).
    pub query: String,
    /// What to match against.
    pub search_type: SearchType,
    /// Restrict hits to these extensions (without the leading dot).
    #[serde(default)]
    pub file_types: Vec<String>,
    /// Minimum file size in bytes.
    #[serde(default)]
    pub min_size: Option<u64>,
    /// Maximum file size in bytes.
    #[serde(default)]
    pub max_size: Option<u64>,
    /// Only files modified strictly after this instant.
    #[serde(default)]
    pub modified_after: Option<Timestamp>,
}

/// One search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// Absolute path of the hit.
    pub path: String,
    /// File size in bytes.
    pub size: u64,
    /// Last modification time.
    pub modified: Timestamp,
    /// File extension, lowercased, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
}

/// Search over the workspace with an optional prebuilt index.
pub struct SearchOps {
    engine: Arc<PolicyEngine>,
    searcher: Arc<dyn ContentSearcher>,
    index: RwLock<Option<Arc<SearchIndex>>>,
}

impl SearchOps {
    /// Create search operations with the default content engine.
    #[must_use]
    pub fn new(engine: Arc<PolicyEngine>) -> Self {
        Self::with_searcher(engine, Arc::new(RegexSearcher))
    }

    /// Create search operations with a custom content engine.
    #[must_use]
    pub fn with_searcher(engine: Arc<PolicyEngine>, searcher: Arc<dyn ContentSearcher>) -> Self {
        Self {
            engine,
            searcher,
            index: RwLock::new(None),
        }
    }

    /// Build (or rebuild) the metadata index over a workspace subtree.
    ///
    /// Entries failing policy re-validation are skipped. With
    /// `include_content`, files up to 1 MiB have their content captured
    /// for later content searches.
    ///
    /// # Errors
    ///
    /// Security rejections of the root argument, or a filesystem error on
    /// the root itself.
    pub async fn build_index(
        &self,
        agent: &AgentId,
        path: &str,
        include_content: bool,
    ) -> CordonResult<IndexStats> {
        let vetted = self.engine.vet(path, OperationKind::Read, agent)?;
        let root = vetted.into_path_buf();
        let engine = Arc::clone(&self.engine);

        let (index, stats) = tokio::task::spawn_blocking(move || {
            build_index_sync(&engine, root, include_content)
        })
        .await
        .map_err(|e| {
            CordonError::Fs(FsOpError::Io(std::io::Error::other(format!(
                "index task failed: {e}"
            ))))
        })??;

        info!(
            files = stats.files_indexed,
            bytes = stats.bytes_indexed,
            include_content,
            "index built"
        );
        *self.index.write().await = Some(Arc::new(index));
        Ok(stats)
    }

    /// Search the workspace.
    ///
    /// Metadata and names are always checked live; content checks prefer
    /// still-current index captures and fall back to reading the file.
    ///
    /// # Errors
    ///
    /// Security rejections or a failed query compilation.
    pub async fn search_files(
        &self,
        agent: &AgentId,
        query: &SearchQuery,
    ) -> CordonResult<Vec<SearchHit>> {
        // The search root is the workspace itself; vet it like any input.
        let root_input = self.engine.workspace_root().to_string_lossy().into_owned();
        let vetted = self.engine.vet(&root_input, OperationKind::Read, agent)?;
        let root = vetted.into_path_buf();

        let matcher = match query.search_type {
            SearchType::Name => None,
            SearchType::Content | SearchType::Both => {
                Some(self.searcher.compile(&query.query)?)
            },
        };

        // Snapshot the index handle; the guard is not held across the walk.
        let index = self.index.read().await.clone();
        let engine = Arc::clone(&self.engine);
        let query = query.clone();

        let hits = tokio::task::spawn_blocking(move || {
            search_sync(&engine, &root, &query, matcher.as_ref(), index.as_deref())
        })
        .await
        .map_err(|e| {
            CordonError::Fs(FsOpError::Io(std::io::Error::other(format!(
                "search task failed: {e}"
            ))))
        })?;
        Ok(hits)
    }

    /// Whether an index is currently loaded.
    pub async fn has_index(&self) -> bool {
        self.index.read().await.is_some()
    }
}

fn build_index_sync(
    engine: &PolicyEngine,
    root: std::path::PathBuf,
    include_content: bool,
) -> CordonResult<(SearchIndex, IndexStats)> {
    if !root.is_dir() {
        return Err(FsOpError::NotADirectory { path: root }.into());
    }

    let started = Instant::now();
    let mut index = SearchIndex::new(root.clone());
    let mut bytes = 0u64;

    for entry in WalkDir::new(&root).follow_links(false) {
        let Ok(entry) = entry else { continue };
        if !entry.file_type().is_file() {
            continue;
        }
        let path_str = entry.path().to_string_lossy();
        if resolve(&path_str, OperationKind::Read, engine.config()).is_err() {
            debug!(path = %path_str, "skipping entry failing re-validation");
            continue;
        }
        let Ok(meta) = entry.metadata() else { continue };

        let content = (include_content && meta.len() <= MAX_INDEXED_CONTENT)
            .then(|| std::fs::read_to_string(entry.path()).ok())
            .flatten();

        let modified = meta
            .modified()
            .map(Timestamp::from)
            .unwrap_or_else(|_| Timestamp::now());
        bytes = bytes.saturating_add(meta.len());
        index.entries.insert(
            entry.path().to_path_buf(),
            IndexEntry {
                size: meta.len(),
                modified,
                extension: extension_of(entry.path()),
                content,
            },
        );
    }

    let stats = IndexStats {
        files_indexed: index.len() as u64,
        bytes_indexed: bytes,
        content_included: include_content,
        duration_ms: started.elapsed().as_millis() as u64,
    };
    Ok((index, stats))
}

fn search_sync(
    engine: &PolicyEngine,
    root: &Path,
    query: &SearchQuery,
    matcher: Option<&Matcher>,
    index: Option<&SearchIndex>,
) -> Vec<SearchHit> {
    let needle = query.query.to_lowercase();
    let mut hits = Vec::new();

    for entry in WalkDir::new(root).follow_links(false) {
        let Ok(entry) = entry else { continue };
        if !entry.file_type().is_file() {
            continue;
        }
        let path_str = entry.path().to_string_lossy().into_owned();
        if resolve(&path_str, OperationKind::Read, engine.config()).is_err() {
            continue;
        }
        let Ok(meta) = entry.metadata() else { continue };

        if !metadata_passes(query, &meta, entry.path()) {
            continue;
        }

        let name_matches = entry
            .file_name()
            .to_string_lossy()
            .to_lowercase()
            .contains(&needle);
        let matched = match query.search_type {
            SearchType::Name => name_matches,
            SearchType::Content => content_matches(matcher, index, entry.path()),
            SearchType::Both => name_matches || content_matches(matcher, index, entry.path()),
        };
        if !matched {
            continue;
        }

        let modified = meta
            .modified()
            .map(Timestamp::from)
            .unwrap_or_else(|_| Timestamp::now());
        hits.push(SearchHit {
            path: path_str,
            size: meta.len(),
            modified,
            extension: extension_of(entry.path()),
        });
    }

    hits.sort_by(|a, b| a.path.cmp(&b.path));
    hits
}

fn metadata_passes(query: &SearchQuery, meta: &std::fs::Metadata, path: &Path) -> bool {
    if !query.file_types.is_empty() {
        let ext = extension_of(path);
        let allowed = ext
            .as_deref()
            .is_some_and(|e| query.file_types.iter().any(|t| t.eq_ignore_ascii_case(e)));
        if !allowed {
            return false;
        }
    }
    if query.min_size.is_some_and(|min| meta.len() < min) {
        return false;
    }
    if query.max_size.is_some_and(|max| meta.len() > max) {
        return false;
    }
    if let Some(after) = query.modified_after {
        let modified = meta.modified().ok().map(Timestamp::from);
        if !modified.is_some_and(|m| m > after) {
            return false;
        }
    }
    true
}

fn content_matches(matcher: Option<&Matcher>, index: Option<&SearchIndex>, path: &Path) -> bool {
    let Some(matcher) = matcher else {
        return false;
    };
    if let Some(content) = index.and_then(|i| i.current_content(path)) {
        return matcher(content);
    }
    match std::fs::read_to_string(path) {
        Ok(content) => matcher(&content),
        // Binary or unreadable content cannot match a text query.
        Err(_) => false,
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_lowercase())
}
