#![allow(dead_code)]

use arxiv_research_mcp::tools::{PaperPipeline, PdfDownloader, PdfTextParser, SearchTool, TextExtractor};
use arxiv_research_mcp::{Config, Result, WorkspaceStore};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::MockServer;

pub const PAPER_TEXT: &str = "Attention mechanisms let a model relate every position of a \
sequence to every other position, which removes the need for recurrence and makes training \
highly parallel.";

pub fn pdf_body() -> Vec<u8> {
    let mut body = b"%PDF-1.4\n".to_vec();
    body.extend(std::iter::repeat(b'x').take(4096));
    body.extend_from_slice(b"\n%%EOF\n");
    body
}

pub fn atom_feed(id: &str, title: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:opensearch="http://a9.com/-/spec/opensearch/1.1/">
  <opensearch:totalResults>1</opensearch:totalResults>
  <entry>
    <id>http://arxiv.org/abs/{id}</id>
    <published>2024-01-02T03:04:05Z</published>
    <title>{title}</title>
    <summary>An abstract
      spread over lines.</summary>
    <author><name>Ada Lovelace</name></author>
    <author><name>Alan Turing</name></author>
  </entry>
</feed>"#
    )
}

/// Slow parser that returns fixed text and counts invocations
#[derive(Default)]
pub struct CountingParser {
    pub calls: AtomicUsize,
}

impl PdfTextParser for CountingParser {
    fn name(&self) -> &str {
        "counting"
    }

    fn parse(&self, _path: &Path) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // long enough for concurrent callers to pile up on the lock
        std::thread::sleep(Duration::from_millis(50));
        Ok(vec![PAPER_TEXT.to_string()])
    }
}

pub struct TestEnv {
    pub dir: TempDir,
    pub server: MockServer,
    pub config: Arc<Config>,
    pub workspace: Arc<WorkspaceStore>,
    pub parser: Arc<CountingParser>,
    pub pipeline: PaperPipeline,
}

impl TestEnv {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;

        let mut config = Config::for_workspace(dir.path().join("work"));
        config.arxiv.api_url = format!("{}/api/query", server.uri());
        config.arxiv.pdf_base_url = format!("{}/pdf", server.uri());
        config.downloads.timeout_secs = 5;
        let config = Arc::new(config);

        let workspace = Arc::new(WorkspaceStore::open(&config.workspace.root).await.unwrap());
        let parser = Arc::new(CountingParser::default());

        let pipeline = PaperPipeline::from_parts(
            Arc::clone(&config),
            Arc::clone(&workspace),
            SearchTool::new(Arc::clone(&config)).unwrap(),
            PdfDownloader::new(Arc::clone(&config), Arc::clone(&workspace)).unwrap(),
            TextExtractor::with_parser(
                Arc::clone(&config),
                Arc::clone(&workspace),
                Arc::clone(&parser) as Arc<dyn PdfTextParser>,
            ),
        );

        Self {
            dir,
            server,
            config,
            workspace,
            parser,
            pipeline,
        }
    }

    pub fn parse_calls(&self) -> usize {
        self.parser.calls.load(Ordering::SeqCst)
    }
}
