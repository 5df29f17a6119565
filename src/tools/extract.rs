//! # Text Extraction
//!
//! Turns a cached PDF into plain text and caches the result next to it.
//! Parsing is CPU-bound and runs on the blocking pool; the parser itself sits
//! behind [`PdfTextParser`] so the backend can be swapped.

use crate::client::{collapse_whitespace, PaperIdentifier, PaperMetadata};
use crate::repositories::{ArtifactKind, WorkspaceStore};
use crate::{Config, Error, Result};
use lopdf::Document;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Input parameters for the PDF-to-text tool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExtractInput {
    /// arXiv identifier or abstract-page URL whose PDF was already downloaded
    pub paper_id: String,
}

/// Backend that pulls raw text fragments out of a PDF file
pub trait PdfTextParser: Send + Sync {
    fn name(&self) -> &str;

    /// Text fragments in reading order. Blocking.
    fn parse(&self, path: &Path) -> Result<Vec<String>>;
}

/// [`PdfTextParser`] built on `lopdf`, one fragment per page
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfParser;

impl PdfTextParser for LopdfParser {
    fn name(&self) -> &str {
        "lopdf"
    }

    fn parse(&self, path: &Path) -> Result<Vec<String>> {
        let doc = Document::load(path).map_err(|e| extraction_error(path, &e.to_string()))?;
        if doc.is_encrypted() {
            return Err(extraction_error(path, "PDF is encrypted"));
        }

        let pages = doc.get_pages();
        debug!("Parsing {} pages from {:?}", pages.len(), path);

        let mut fragments = Vec::with_capacity(pages.len());
        let mut last_error = None;
        for page_number in pages.keys() {
            match doc.extract_text(&[*page_number]) {
                Ok(text) => fragments.push(text),
                Err(e) => {
                    warn!("Skipping page {} of {:?}: {}", page_number, path, e);
                    last_error = Some(e);
                }
            }
        }

        if fragments.is_empty() {
            let reason = last_error.map_or_else(
                || "PDF has no pages".to_string(),
                |e| format!("no page could be read: {e}"),
            );
            return Err(extraction_error(path, &reason));
        }
        Ok(fragments)
    }
}

/// Extracts and caches PDF text
#[derive(Clone)]
pub struct TextExtractor {
    workspace: Arc<WorkspaceStore>,
    config: Arc<Config>,
    parser: Arc<dyn PdfTextParser>,
}

impl std::fmt::Debug for TextExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextExtractor")
            .field("workspace", &self.workspace.root())
            .field("parser", &self.parser.name())
            .field("min_text_chars", &self.config.extraction.min_text_chars)
            .finish()
    }
}

impl TextExtractor {
    #[must_use]
    pub fn new(config: Arc<Config>, workspace: Arc<WorkspaceStore>) -> Self {
        Self::with_parser(config, workspace, Arc::new(LopdfParser))
    }

    #[must_use]
    pub fn with_parser(
        config: Arc<Config>,
        workspace: Arc<WorkspaceStore>,
        parser: Arc<dyn PdfTextParser>,
    ) -> Self {
        Self {
            workspace,
            config,
            parser,
        }
    }

    /// Extract normalized text from a PDF file
    ///
    /// Fragments are joined with single spaces, whitespace runs collapsed and
    /// the result trimmed. Text shorter than the configured floor is treated
    /// as a failed extraction.
    #[instrument(skip(self))]
    pub async fn extract_text(&self, pdf_path: &Path) -> Result<String> {
        let start = Instant::now();
        let parser = Arc::clone(&self.parser);
        let path = pdf_path.to_path_buf();

        let fragments = tokio::task::spawn_blocking(move || parser.parse(&path))
            .await
            .map_err(|e| extraction_error(pdf_path, &format!("parser task failed: {e}")))??;

        let text = normalize_fragments(&fragments);
        let chars = text.chars().count();
        let min = self.config.extraction.min_text_chars;
        if chars < min {
            return Err(Error::ExtractionTooShort { chars, min });
        }

        debug!(
            "Extracted {} characters from {:?} in {:?}",
            chars,
            pdf_path,
            start.elapsed()
        );
        Ok(text)
    }

    /// Return cached text for an identifier, extracting it on first use
    #[instrument(skip(self, metadata), fields(id = %id.normalized_id))]
    pub async fn parse_and_cache(
        &self,
        id: &PaperIdentifier,
        metadata: Option<&PaperMetadata>,
    ) -> Result<String> {
        let key = id.normalized_id.as_str();

        if self.workspace.exists(key, ArtifactKind::Text).await? {
            debug!("Text already cached for {}", key);
            return self.workspace.read_to_string(key, ArtifactKind::Text).await;
        }

        let _guard = self.workspace.lock(key, ArtifactKind::Text).await;
        if self.workspace.exists(key, ArtifactKind::Text).await? {
            debug!("Text cached by a concurrent caller for {}", key);
            return self.workspace.read_to_string(key, ArtifactKind::Text).await;
        }

        let pdf_path = self.workspace.path(key, ArtifactKind::Pdf);
        if !self.workspace.exists(key, ArtifactKind::Pdf).await? {
            return Err(Error::MissingPdf { path: pdf_path });
        }

        let body = self.extract_text(&pdf_path).await?;
        let content = match metadata {
            Some(meta) => format!("{}{body}", metadata_header(&id.raw_id, meta)),
            None => body,
        };

        let path = self
            .workspace
            .write(key, ArtifactKind::Text, content.as_bytes())
            .await?;
        info!("Saved extracted text to {:?}", path);
        Ok(content)
    }

    /// Resolve user input and return its text
    pub async fn extract_for(&self, input: &str) -> Result<String> {
        let id = PaperIdentifier::parse(input, &self.config.arxiv.pdf_base_url)?;
        self.parse_and_cache(&id, None).await
    }

    /// Path the text artifact for an identifier lives at
    #[must_use]
    pub fn text_path(&self, id: &PaperIdentifier) -> PathBuf {
        self.workspace.path(&id.normalized_id, ArtifactKind::Text)
    }

    /// Previously produced translation, if one is in the workspace
    pub async fn cached_translation(&self, id: &PaperIdentifier) -> Result<Option<String>> {
        let key = id.normalized_id.as_str();
        if !self
            .workspace
            .exists(key, ArtifactKind::TranslatedMarkdown)
            .await?
        {
            return Ok(None);
        }
        self.workspace
            .read_to_string(key, ArtifactKind::TranslatedMarkdown)
            .await
            .map(Some)
    }
}

/// Join fragments and collapse whitespace
#[must_use]
pub fn normalize_fragments(fragments: &[String]) -> String {
    collapse_whitespace(&fragments.join(" "))
}

/// Paper details written above the extracted text
#[must_use]
pub fn metadata_header(raw_id: &str, meta: &PaperMetadata) -> String {
    let mut header = String::from("=== Paper Information ===\n");
    let _ = writeln!(header, "Title: {}", meta.title);
    let _ = writeln!(header, "arXiv ID: {raw_id}");
    let _ = writeln!(header, "Published: {}", meta.published);
    if !meta.authors.is_empty() {
        let _ = writeln!(header, "Authors: {}", meta.author_names());
    }
    let _ = writeln!(header, "Abstract: {}", meta.summary);
    header.push_str("\n=== Extracted Text ===\n\n");
    header
}

fn extraction_error(path: &Path, reason: &str) -> Error {
    Error::Extraction {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}
