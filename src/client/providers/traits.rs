use crate::client::{PaperMetadata, SearchResults};
use async_trait::async_trait;
use thiserror::Error;

/// Search query parameters for a catalog provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    /// Free-text query
    pub query: String,
    /// Maximum results to return, already clamped by the caller
    pub max_results: u32,
    /// Search offset for pagination
    pub offset: u32,
}

impl SearchQuery {
    #[must_use]
    pub fn new(query: impl Into<String>, max_results: u32) -> Self {
        Self {
            query: query.into(),
            max_results,
            offset: 0,
        }
    }
}

/// Errors that can occur during provider operations
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Timeout occurred")]
    Timeout,

    #[error("Provider error: {0}")]
    Other(String),
}

/// A remote catalog that can describe papers
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Unique name/identifier for this provider
    fn name(&self) -> &str;

    /// Free-text search
    async fn search(&self, query: &SearchQuery) -> Result<SearchResults, ProviderError>;

    /// Exact lookup of one paper by catalog identifier
    async fn lookup(&self, id: &str) -> Result<Option<PaperMetadata>, ProviderError> {
        let result = self.search(&SearchQuery::new(id, 1)).await?;
        Ok(result.papers.into_iter().next())
    }
}
