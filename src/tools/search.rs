use crate::client::providers::{ArxivProvider, MetadataProvider, SearchQuery};
use crate::client::{PaperMetadata, SearchResults};
use crate::{Config, Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Input parameters for the arXiv search tool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchInput {
    /// Free-text query matched against all catalog fields
    pub query: String,
    /// Maximum number of results to return (default: 5)
    #[serde(default = "default_max_results")]
    pub max_results: i64,
}

const fn default_max_results() -> i64 {
    5
}

/// Metadata search over a catalog provider
#[derive(Clone)]
pub struct SearchTool {
    provider: Arc<dyn MetadataProvider>,
    config: Arc<Config>,
}

impl std::fmt::Debug for SearchTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchTool")
            .field("provider", &self.provider.name())
            .field("max_results_cap", &self.config.arxiv.max_results_cap)
            .finish()
    }
}

impl SearchTool {
    /// Create a search tool backed by the arXiv API
    pub fn new(config: Arc<Config>) -> Result<Self> {
        info!("Initializing arXiv search tool");
        let provider = ArxivProvider::new(&config.arxiv)?;
        Ok(Self::with_provider(Arc::new(provider), config))
    }

    /// Create a search tool over any provider
    #[must_use]
    pub fn with_provider(provider: Arc<dyn MetadataProvider>, config: Arc<Config>) -> Self {
        Self { provider, config }
    }

    /// Search the catalog; `max_results` is clamped to `[1, cap]`
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str, max_results: i64) -> Result<SearchResults> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidInput {
                field: "query".to_string(),
                reason: "Query cannot be empty".to_string(),
            });
        }

        let limit = self.clamp_max_results(max_results);
        let start = Instant::now();
        let results = self
            .provider
            .search(&SearchQuery::new(query, limit))
            .await?;

        info!(
            "Search '{}' returned {} of {} results in {:?}",
            query,
            results.papers.len(),
            results.total_results,
            start.elapsed()
        );
        Ok(results)
    }

    /// Exact metadata lookup by (possibly versioned) identifier
    #[instrument(skip(self))]
    pub async fn lookup(&self, raw_id: &str) -> Result<Option<PaperMetadata>> {
        let paper = self.provider.lookup(raw_id).await?;
        match &paper {
            Some(p) => debug!("Found metadata for {}: {}", raw_id, p.title),
            None => debug!("No catalog entry for {}", raw_id),
        }
        Ok(paper)
    }

    fn clamp_max_results(&self, requested: i64) -> u32 {
        let cap = self.config.arxiv.max_results_cap;
        let clamped = u32::try_from(requested.clamp(1, i64::from(cap))).unwrap_or(cap);
        if i64::from(clamped) != requested {
            warn!(
                "max_results {} outside [1, {}], using {}",
                requested, cap, clamped
            );
        }
        clamped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::providers::ProviderError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingProvider {
        seen: Mutex<Vec<SearchQuery>>,
        fail: bool,
    }

    #[async_trait]
    impl MetadataProvider for RecordingProvider {
        fn name(&self) -> &str {
            "recording"
        }

        async fn search(&self, query: &SearchQuery) -> std::result::Result<SearchResults, ProviderError> {
            self.seen.lock().unwrap().push(query.clone());
            if self.fail {
                return Err(ProviderError::Status {
                    status: 503,
                    message: "down".to_string(),
                });
            }
            Ok(SearchResults::default())
        }
    }

    fn tool(provider: Arc<RecordingProvider>) -> SearchTool {
        SearchTool::with_provider(provider, Arc::new(Config::default()))
    }

    #[tokio::test]
    async fn test_max_results_is_clamped() {
        let provider = Arc::new(RecordingProvider::default());
        let tool = tool(Arc::clone(&provider));

        tool.search("transformers", 0).await.unwrap();
        tool.search("transformers", -3).await.unwrap();
        tool.search("transformers", 5000).await.unwrap();
        tool.search("transformers", 7).await.unwrap();

        let limits: Vec<u32> = provider
            .seen
            .lock()
            .unwrap()
            .iter()
            .map(|q| q.max_results)
            .collect();
        assert_eq!(limits, vec![1, 1, 100, 7]);
    }

    #[tokio::test]
    async fn test_empty_query_never_reaches_provider() {
        let provider = Arc::new(RecordingProvider::default());
        let err = tool(Arc::clone(&provider)).search("   ", 5).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput { .. }));
        assert!(provider.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_provider_failure_is_upstream_metadata() {
        let provider = Arc::new(RecordingProvider {
            fail: true,
            ..RecordingProvider::default()
        });
        let err = tool(provider).lookup("2401.00001").await.unwrap_err();
        assert!(matches!(err, Error::UpstreamMetadata(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_default_max_results() {
        let input: SearchInput = serde_json::from_str(r#"{"query":"graphs"}"#).unwrap();
        assert_eq!(input.max_results, 5);
    }
}
