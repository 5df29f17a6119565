use crate::client::SearchResults;
use crate::repositories::WorkspaceStore;
use crate::tools::{DownloadInput, ExtractInput, PaperPipeline, ProcessInput, SearchInput};
use crate::{Config, Error};
use rmcp::{
    handler::server::tool::ToolRouter, handler::server::wrapper::Parameters, model::*, tool,
    tool_handler, tool_router, ErrorData, ServerHandler,
};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info, warn};

const INSTRUCTIONS: &str = "arXiv paper tools. Search the catalog, download a paper's PDF into \
the workspace, extract its text, or run the whole pipeline in one call. Artifacts are cached per \
paper, so repeating a request is cheap.";

const SUMMARY_PREVIEW_CHARS: usize = 300;

/// MCP handler exposing the paper pipeline as tools
#[derive(Clone)]
pub struct ArxivServerHandler {
    config: Arc<Config>,
    pipeline: Arc<PaperPipeline>,
    tool_router: ToolRouter<Self>,
}

impl std::fmt::Debug for ArxivServerHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArxivServerHandler")
            .field("workspace", &self.config.workspace.root)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

#[tool_router]
impl ArxivServerHandler {
    /// Open the workspace and build every component
    pub async fn new(config: Arc<Config>) -> crate::Result<Self> {
        info!("Initializing arXiv MCP server handler");
        let workspace = Arc::new(WorkspaceStore::open(&config.workspace.root).await?);
        let pipeline = PaperPipeline::new(Arc::clone(&config), workspace)?;
        Ok(Self::with_pipeline(config, Arc::new(pipeline)))
    }

    #[must_use]
    pub fn with_pipeline(config: Arc<Config>, pipeline: Arc<PaperPipeline>) -> Self {
        Self {
            config,
            pipeline,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "Search arXiv papers by free-text query. Returns title, id, publication \
date, authors, an abstract preview and the abstract URL for each hit.")]
    async fn search_arxiv(
        &self,
        Parameters(input): Parameters<SearchInput>,
    ) -> std::result::Result<CallToolResult, ErrorData> {
        debug!("search_arxiv: {:?}", input);
        match self
            .pipeline
            .search()
            .search(&input.query, input.max_results)
            .await
        {
            Ok(results) => Ok(text_result(format_search_results(&input.query, &results))),
            Err(e) => Ok(tool_error("search_arxiv", &e)),
        }
    }

    #[tool(description = "Download the PDF for an arXiv id (e.g. 2401.00001v2) or abstract URL \
into the workspace. Returns the local path; an already downloaded PDF is reused.")]
    async fn download_arxiv_pdf(
        &self,
        Parameters(input): Parameters<DownloadInput>,
    ) -> std::result::Result<CallToolResult, ErrorData> {
        match self.pipeline.downloader().download(&input.paper_id).await {
            Ok(outcome) => {
                let mut text = format!("PDF saved to {}", outcome.path.display());
                if outcome.cached {
                    text.push_str(" (already downloaded)");
                } else if let Some(sha) = &outcome.sha256 {
                    let _ = write!(text, "\nSize: {} bytes\nSHA-256: {sha}", outcome.bytes);
                }
                Ok(text_result(text))
            }
            Err(e) => Ok(tool_error("download_arxiv_pdf", &e)),
        }
    }

    #[tool(description = "Extract plain text from a previously downloaded arXiv PDF. The text is \
cached next to the PDF.")]
    async fn parse_pdf_to_text(
        &self,
        Parameters(input): Parameters<ExtractInput>,
    ) -> std::result::Result<CallToolResult, ErrorData> {
        match self.pipeline.extractor().extract_for(&input.paper_id).await {
            Ok(text) => Ok(text_result(text)),
            Err(e) => Ok(tool_error("parse_pdf_to_text", &e)),
        }
    }

    #[tool(description = "Process an arXiv paper end to end: look up metadata, download the PDF \
and extract its text. Returns a step-by-step log.")]
    async fn process_arxiv_paper(
        &self,
        Parameters(input): Parameters<ProcessInput>,
    ) -> std::result::Result<CallToolResult, ErrorData> {
        match self
            .pipeline
            .process_paper(&input.paper_id, input.include_metadata)
            .await
        {
            Ok(run) => Ok(text_result(run.log().join("\n"))),
            Err(e) => Ok(tool_error("process_arxiv_paper", &e)),
        }
    }

    #[tool(description = "Delete every cached PDF, text and translation file from the workspace.")]
    async fn clear_workdir(&self) -> std::result::Result<CallToolResult, ErrorData> {
        match self.pipeline.workspace().clear_all().await {
            Ok(report) => {
                let mut text = report.message.clone();
                for path in &report.removed {
                    let _ = write!(text, "\n- {}", path.display());
                }
                Ok(text_result(text))
            }
            Err(e) => Ok(tool_error("clear_workdir", &e)),
        }
    }

    /// Get the server configuration
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[tool_handler]
impl ServerHandler for ArxivServerHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(INSTRUCTIONS.into()),
        }
    }
}

fn text_result(text: String) -> CallToolResult {
    CallToolResult::success(vec![Content::text(text)])
}

/// Tool-level failure carrying the stage-tagged message and any run log
fn tool_error(tool: &str, err: &Error) -> CallToolResult {
    warn!("{} failed: {}", tool, err);
    let mut text = err.to_string();
    if let Some(log) = err.run_log() {
        text.push_str("\n\nRun log:");
        for line in log {
            let _ = write!(text, "\n{line}");
        }
    }
    CallToolResult::error(vec![Content::text(text)])
}

/// Numbered listing of search hits
#[must_use]
pub fn format_search_results(query: &str, results: &SearchResults) -> String {
    if results.papers.is_empty() {
        return format!("No papers found for '{query}'");
    }

    let mut out = format!(
        "Found {} papers for '{query}' (showing {})\n",
        results.total_results,
        results.papers.len()
    );
    for (index, paper) in results.papers.iter().enumerate() {
        let mut summary: String = paper.summary.chars().take(SUMMARY_PREVIEW_CHARS).collect();
        if paper.summary.chars().count() > SUMMARY_PREVIEW_CHARS {
            summary.push_str("...");
        }
        let _ = write!(
            out,
            "\n{}. **{}**\n   ID: {}\n   Published: {}\n   Authors: {}\n   Summary: {}\n   URL: {}\n",
            index + 1,
            paper.title,
            paper.id,
            paper.published,
            paper.author_names(),
            summary,
            paper.url
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Author, PaperMetadata};
    use tempfile::TempDir;

    async fn handler() -> (TempDir, ArxivServerHandler) {
        let dir = TempDir::new().unwrap();
        let config = Arc::new(Config::for_workspace(dir.path()));
        (dir, ArxivServerHandler::new(config).await.unwrap())
    }

    fn first_text(result: &CallToolResult) -> String {
        result
            .content
            .first()
            .and_then(|c| c.as_text())
            .map(|t| t.text.clone())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_server_info_enables_tools() {
        let (_dir, handler) = handler().await;
        let info = handler.get_info();
        assert!(info.capabilities.tools.is_some());
        assert!(info.instructions.unwrap().contains("arXiv"));
    }

    #[tokio::test]
    async fn test_tool_errors_are_results() {
        let (_dir, handler) = handler().await;

        let result = handler
            .search_arxiv(Parameters(SearchInput {
                query: "  ".to_string(),
                max_results: 5,
            }))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));

        let result = handler
            .parse_pdf_to_text(Parameters(ExtractInput {
                paper_id: "2401.00001".to_string(),
            }))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
        assert!(first_text(&result).contains("download it first"));

        let result = handler
            .process_arxiv_paper(Parameters(ProcessInput {
                paper_id: "https://example.org/nothing".to_string(),
                include_metadata: false,
            }))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
        assert!(first_text(&result).contains("Run log:"));
    }

    #[tokio::test]
    async fn test_clear_workdir() {
        let (dir, handler) = handler().await;
        std::fs::write(dir.path().join("2401.00001.pdf"), b"%PDF").unwrap();

        let result = handler.clear_workdir().await.unwrap();
        assert_eq!(result.is_error, Some(false));
        assert!(first_text(&result).contains("2401.00001.pdf"));
        assert!(dir.path().exists());
    }

    #[test]
    fn test_format_search_results() {
        let results = SearchResults {
            total_results: 12,
            papers: vec![PaperMetadata {
                id: "2401.00001v1".to_string(),
                url: "http://arxiv.org/abs/2401.00001v1".to_string(),
                title: "A Title".to_string(),
                summary: "x".repeat(400),
                published: "2024-01-01T00:00:00Z".to_string(),
                authors: vec![Author {
                    name: "Grace Hopper".to_string(),
                }],
            }],
        };

        let text = format_search_results("title", &results);
        assert!(text.starts_with("Found 12 papers for 'title' (showing 1)"));
        assert!(text.contains("1. **A Title**"));
        assert!(text.contains("Authors: Grace Hopper"));
        assert!(text.contains(&format!("{}...", "x".repeat(300))));

        assert_eq!(
            format_search_results("none", &SearchResults::default()),
            "No papers found for 'none'"
        );
    }
}
