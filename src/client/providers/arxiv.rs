use super::traits::{MetadataProvider, ProviderError, SearchQuery};
use crate::client::{collapse_whitespace, Author, HttpClientConfig, PaperMetadata, SearchResults};
use crate::config::ArxivConfig;
use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};
use url::Url;

/// arXiv Atom API provider
#[derive(Debug, Clone)]
pub struct ArxivProvider {
    client: Client,
    base_url: String,
}

impl ArxivProvider {
    /// Create a new arXiv provider
    pub fn new(config: &ArxivConfig) -> Result<Self, ProviderError> {
        let client = HttpClientConfig {
            timeout: Duration::from_secs(config.timeout_secs),
            user_agent: config.user_agent.clone(),
            ..HttpClientConfig::default()
        }
        .build()
        .map_err(|e| ProviderError::Other(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.api_url.clone(),
        })
    }

    /// Build arXiv API URL for a free-text search
    fn build_search_url(&self, query: &SearchQuery) -> Result<String, ProviderError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ProviderError::Other(format!("Invalid base URL: {e}")))?;

        url.query_pairs_mut()
            .append_pair("search_query", &format!("all:{}", query.query))
            .append_pair("start", &query.offset.to_string())
            .append_pair("max_results", &query.max_results.to_string());

        Ok(url.to_string())
    }

    /// Build arXiv API URL for an exact identifier lookup
    fn build_lookup_url(&self, id: &str) -> Result<String, ProviderError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ProviderError::Other(format!("Invalid base URL: {e}")))?;

        url.query_pairs_mut()
            .append_pair("id_list", id)
            .append_pair("max_results", "1");

        Ok(url.to_string())
    }

    async fn fetch_feed(&self, url: &str) -> Result<String, ProviderError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            error!("arXiv request failed: {}", e);
            if e.is_timeout() {
                ProviderError::Timeout
            } else if e.is_connect() {
                ProviderError::Network(format!("Connection failed: {e}"))
            } else {
                ProviderError::Network(format!("Request failed: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                message: error_text.chars().take(200).collect(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| ProviderError::Network(format!("Failed to read response: {e}")))
    }

    /// Parse an arXiv Atom feed
    pub fn parse_feed(response_text: &str) -> Result<SearchResults, ProviderError> {
        use roxmltree::Document;

        let doc = Document::parse(response_text)
            .map_err(|e| ProviderError::Parse(format!("Failed to parse XML: {e}")))?;

        let mut papers = Vec::new();

        for entry in doc.descendants().filter(|n| n.has_tag_name("entry")) {
            let mut paper = PaperMetadata {
                id: String::new(),
                url: String::new(),
                title: String::new(),
                summary: String::new(),
                published: String::new(),
                authors: Vec::new(),
            };

            for child in entry.children().filter(roxmltree::Node::is_element) {
                match child.tag_name().name() {
                    "id" => {
                        if let Some(url) = child.text() {
                            let url = url.trim();
                            paper.url = url.to_string();
                            paper.id = entry_id(url);
                        }
                    }
                    "title" => paper.title = collapse_whitespace(child.text().unwrap_or_default()),
                    "summary" => {
                        paper.summary = collapse_whitespace(child.text().unwrap_or_default());
                    }
                    "published" => {
                        paper.published = child.text().unwrap_or_default().trim().to_string();
                    }
                    "author" => {
                        for name_elem in child.descendants().filter(|n| n.has_tag_name("name")) {
                            if let Some(author_name) = name_elem.text() {
                                paper.authors.push(Author {
                                    name: collapse_whitespace(author_name),
                                });
                            }
                        }
                    }
                    _ => {}
                }
            }

            // the API reports bad id_list values as an "Error" entry
            if paper.url.contains("/api/errors") || paper.id.is_empty() {
                debug!("Skipping arXiv error entry: {}", paper.title);
                continue;
            }
            papers.push(paper);
        }

        let total_results = doc
            .descendants()
            .find(|n| n.has_tag_name("totalResults"))
            .and_then(|n| n.text())
            .and_then(|t| t.trim().parse::<u64>().ok())
            .unwrap_or(papers.len() as u64);

        debug!("Parsed {} papers from arXiv response", papers.len());
        Ok(SearchResults {
            total_results,
            papers,
        })
    }
}

/// Identifier part of an entry URL (`http://arxiv.org/abs/2403.15137v1`)
fn entry_id(url: &str) -> String {
    url.split_once("/abs/")
        .map(|(_, id)| id)
        .or_else(|| url.rsplit('/').next())
        .unwrap_or(url)
        .trim_end_matches('/')
        .to_string()
}

#[async_trait]
impl MetadataProvider for ArxivProvider {
    fn name(&self) -> &str {
        "arxiv"
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchResults, ProviderError> {
        let start_time = Instant::now();
        info!("Searching arXiv for: {}", query.query);

        let url = self.build_search_url(query)?;
        debug!("arXiv search URL: {}", url);

        let body = self.fetch_feed(&url).await?;
        let results = Self::parse_feed(&body)?;

        info!(
            "arXiv search completed: {} of {} papers in {:?}",
            results.papers.len(),
            results.total_results,
            start_time.elapsed()
        );
        Ok(results)
    }

    async fn lookup(&self, id: &str) -> Result<Option<PaperMetadata>, ProviderError> {
        let url = self.build_lookup_url(id)?;
        debug!("arXiv lookup URL: {}", url);

        let body = self.fetch_feed(&url).await?;
        Ok(Self::parse_feed(&body)?.papers.into_iter().next())
    }
}
