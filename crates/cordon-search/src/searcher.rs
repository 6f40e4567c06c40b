//! The pluggable content-search engine boundary.

use cordon_core::OperationError;

/// A compiled content matcher, reusable across files.
pub type Matcher = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// Substring search over file contents, treated as a black box.
pub trait ContentSearcher: Send + Sync {
    /// Compile a query into a matcher applied per file.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::SearchFailed`] if the query cannot be
    /// compiled.
    fn compile(&self, query: &str) -> Result<Matcher, OperationError>;
}

/// Default engine: the query is escaped and matched case-insensitively.
#[derive(Debug, Default)]
pub struct RegexSearcher;

impl ContentSearcher for RegexSearcher {
    fn compile(&self, query: &str) -> Result<Matcher, OperationError> {
        let pattern = format!("(?i){}", regex::escape(query));
        let re = regex::Regex::new(&pattern).map_err(|e| OperationError::SearchFailed {
            error: format!("query compilation failed: {e}"),
        })?;
        Ok(Box::new(move |content: &str| re.is_match(content)))
    }
}
