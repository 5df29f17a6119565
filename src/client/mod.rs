pub mod identifier;
pub mod providers;

pub use identifier::{normalize, PaperIdentifier, DEFAULT_PDF_BASE_URL};
pub use providers::{ArxivProvider, MetadataProvider, ProviderError};

use crate::Result;
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

/// HTTP client configuration for catalog and PDF requests
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout duration
    pub timeout: Duration,
    /// Connection timeout duration
    pub connect_timeout: Duration,
    /// Maximum redirects to follow
    pub max_redirects: usize,
    /// User agent string
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            max_redirects: 10,
            user_agent: "arxiv-research-mcp/0.1.0 (Academic Research Tool)".to_string(),
        }
    }
}

impl HttpClientConfig {
    /// Build a `reqwest` client from this configuration
    pub fn build(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .redirect(reqwest::redirect::Policy::limited(self.max_redirects))
            .user_agent(&self.user_agent)
            .build()
            .map_err(|e| crate::Error::Service(format!("Failed to create HTTP client: {e}")))
    }
}

/// Paper author as reported by the catalog
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize, schemars::JsonSchema)]
pub struct Author {
    pub name: String,
}

/// Paper metadata returned by the catalog
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize, schemars::JsonSchema)]
pub struct PaperMetadata {
    /// arXiv identifier, versioned as the catalog reports it
    pub id: String,
    /// Abstract page URL
    pub url: String,
    /// Whitespace-collapsed title
    pub title: String,
    /// Whitespace-collapsed abstract
    pub summary: String,
    /// Publication timestamp as reported (RFC 3339)
    pub published: String,
    pub authors: Vec<Author>,
}

impl PaperMetadata {
    /// Comma-separated author names
    #[must_use]
    pub fn author_names(&self) -> String {
        self.authors
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Result page of a catalog search
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize, schemars::JsonSchema)]
pub struct SearchResults {
    /// Total hits the catalog reports for the query
    pub total_results: u64,
    pub papers: Vec<PaperMetadata>,
}

fn whitespace_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

/// Collapse whitespace runs to single spaces and trim
#[must_use]
pub fn collapse_whitespace(text: &str) -> String {
    whitespace_run().replace_all(text.trim(), " ").into_owned()
}
