use super::{PdfDownloader, SearchTool, TextExtractor};
use crate::client::{PaperIdentifier, PaperMetadata};
use crate::error::Stage;
use crate::repositories::{ArtifactKind, WorkspaceStore};
use crate::{Config, Error, Result};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Input parameters for the full processing tool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProcessInput {
    /// arXiv identifier or abstract-page URL
    pub paper_id: String,
    /// Look up catalog metadata and prepend it to the text (default: true)
    #[serde(default = "default_include_metadata")]
    pub include_metadata: bool,
}

const fn default_include_metadata() -> bool {
    true
}

/// Outcome of one pipeline step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StepOutcome {
    pub step: Stage,
    pub success: bool,
    /// Step failed but the run continued without its result
    pub degraded: bool,
    pub detail: String,
}

impl StepOutcome {
    fn ok(step: Stage, detail: impl Into<String>) -> Self {
        Self {
            step,
            success: true,
            degraded: false,
            detail: detail.into(),
        }
    }

    fn degraded(step: Stage, detail: impl Into<String>) -> Self {
        Self {
            step,
            success: false,
            degraded: true,
            detail: detail.into(),
        }
    }

    fn failed(step: Stage, detail: impl Into<String>) -> Self {
        Self {
            step,
            success: false,
            degraded: false,
            detail: detail.into(),
        }
    }

    /// Human-readable log line
    #[must_use]
    pub fn line(&self) -> String {
        let status = match (self.success, self.degraded) {
            (true, _) => "ok",
            (false, true) => "degraded",
            (false, false) => "failed",
        };
        format!("[{}] {status}: {}", self.step, self.detail)
    }
}

/// Record of a single pipeline invocation
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PipelineRun {
    pub run_id: Uuid,
    /// Input as the caller supplied it
    pub identifier: String,
    pub started_at: DateTime<Utc>,
    pub steps: Vec<StepOutcome>,
}

impl PipelineRun {
    fn new(identifier: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            identifier: identifier.to_string(),
            started_at: Utc::now(),
            steps: Vec::new(),
        }
    }

    fn record(&mut self, outcome: StepOutcome) {
        info!(run_id = %self.run_id, "{}", outcome.line());
        self.steps.push(outcome);
    }

    /// Append a failed step and wrap the error with the log so far
    fn abort(mut self, stage: Stage, err: Error) -> Error {
        self.record(StepOutcome::failed(stage, err.to_string()));
        Error::Pipeline {
            stage,
            log: self.log(),
            source: Box::new(err),
        }
    }

    /// One line per step, in order
    #[must_use]
    pub fn log(&self) -> Vec<String> {
        self.steps.iter().map(StepOutcome::line).collect()
    }

    /// Whether any step ran in degraded mode
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.steps.iter().any(|s| s.degraded)
    }
}

/// Resolve, describe, download and extract a paper in one call
#[derive(Debug, Clone)]
pub struct PaperPipeline {
    config: Arc<Config>,
    workspace: Arc<WorkspaceStore>,
    search: SearchTool,
    downloader: PdfDownloader,
    extractor: TextExtractor,
}

impl PaperPipeline {
    /// Build the pipeline and its components from configuration
    pub fn new(config: Arc<Config>, workspace: Arc<WorkspaceStore>) -> Result<Self> {
        let search = SearchTool::new(Arc::clone(&config))?;
        let downloader = PdfDownloader::new(Arc::clone(&config), Arc::clone(&workspace))?;
        let extractor = TextExtractor::new(Arc::clone(&config), Arc::clone(&workspace));
        Ok(Self::from_parts(config, workspace, search, downloader, extractor))
    }

    #[must_use]
    pub fn from_parts(
        config: Arc<Config>,
        workspace: Arc<WorkspaceStore>,
        search: SearchTool,
        downloader: PdfDownloader,
        extractor: TextExtractor,
    ) -> Self {
        Self {
            config,
            workspace,
            search,
            downloader,
            extractor,
        }
    }

    #[must_use]
    pub const fn search(&self) -> &SearchTool {
        &self.search
    }

    #[must_use]
    pub const fn downloader(&self) -> &PdfDownloader {
        &self.downloader
    }

    #[must_use]
    pub const fn extractor(&self) -> &TextExtractor {
        &self.extractor
    }

    #[must_use]
    pub fn workspace(&self) -> &WorkspaceStore {
        &self.workspace
    }

    /// Run every stage for one paper
    ///
    /// Only the metadata stage may fail without aborting the run; every
    /// other failure returns [`Error::Pipeline`] carrying the log so far.
    #[instrument(skip(self))]
    pub async fn process_paper(&self, raw_input: &str, include_metadata: bool) -> Result<PipelineRun> {
        let mut run = PipelineRun::new(raw_input);
        info!(run_id = %run.run_id, "Processing paper {}", raw_input);

        let id = match PaperIdentifier::parse(raw_input, &self.config.arxiv.pdf_base_url) {
            Ok(id) => id,
            Err(e) => return Err(run.abort(Stage::Resolve, e)),
        };
        run.record(StepOutcome::ok(
            Stage::Resolve,
            format!(
                "resolved '{}' to {} ({})",
                raw_input.trim(),
                id.normalized_id,
                id.derived_pdf_url
            ),
        ));

        let metadata = if include_metadata {
            self.metadata_step(&id, &mut run).await
        } else {
            run.record(StepOutcome::ok(Stage::Metadata, "skipped"));
            None
        };

        let download = match self.downloader.fetch_pdf(&id).await {
            Ok(outcome) => outcome,
            Err(e) => return Err(run.abort(Stage::Download, e)),
        };
        run.record(StepOutcome::ok(
            Stage::Download,
            if download.cached {
                format!("PDF already cached at {}", download.path.display())
            } else {
                format!(
                    "downloaded {} bytes to {}",
                    download.bytes,
                    download.path.display()
                )
            },
        ));

        if let Err(e) = self.extractor.parse_and_cache(&id, metadata.as_ref()).await {
            return Err(run.abort(Stage::Extract, e));
        }
        let text_file = WorkspaceStore::file_name(&id.normalized_id, ArtifactKind::Text);
        run.record(StepOutcome::ok(
            Stage::Extract,
            format!("text extracted to {text_file}"),
        ));

        let summary = match self.summary(&id, &text_file, metadata.as_ref()).await {
            Ok(summary) => summary,
            Err(e) => return Err(run.abort(Stage::Summary, e)),
        };
        run.record(StepOutcome::ok(Stage::Summary, summary));

        Ok(run)
    }

    async fn metadata_step(&self, id: &PaperIdentifier, run: &mut PipelineRun) -> Option<PaperMetadata> {
        match self.search.lookup(&id.raw_id).await {
            Ok(Some(meta)) => {
                run.record(StepOutcome::ok(
                    Stage::Metadata,
                    format!("found '{}'", meta.title),
                ));
                Some(meta)
            }
            Ok(None) => {
                run.record(StepOutcome::degraded(
                    Stage::Metadata,
                    format!("no catalog entry for {}; continuing without metadata", id.raw_id),
                ));
                None
            }
            Err(e) => {
                warn!("Metadata lookup for {} failed: {}", id.raw_id, e);
                run.record(StepOutcome::degraded(
                    Stage::Metadata,
                    format!("{e}; continuing without metadata"),
                ));
                None
            }
        }
    }

    async fn summary(
        &self,
        id: &PaperIdentifier,
        text_file: &str,
        metadata: Option<&PaperMetadata>,
    ) -> Result<String> {
        let mut parts = vec![
            format!("paper {} processed", id.raw_id),
            format!("files in {}", self.workspace.root().display()),
            format!("text: {text_file}"),
        ];

        if self.extractor.cached_translation(id).await?.is_some() {
            parts.push(format!(
                "translation already available: {}",
                WorkspaceStore::file_name(&id.normalized_id, ArtifactKind::TranslatedMarkdown)
            ));
        }

        if let Some(meta) = metadata {
            parts.push(format!("title: {}", meta.title));
            parts.push(format!("authors: {}", meta.author_names()));
            parts.push(format!("published: {}", meta.published));
        }

        Ok(parts.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_lines() {
        assert_eq!(
            StepOutcome::ok(Stage::Download, "done").line(),
            "[download] ok: done"
        );
        assert_eq!(
            StepOutcome::degraded(Stage::Metadata, "offline").line(),
            "[metadata] degraded: offline"
        );
        assert_eq!(
            StepOutcome::failed(Stage::Extract, "too short").line(),
            "[extract] failed: too short"
        );
    }

    #[test]
    fn test_abort_keeps_truncated_log() {
        let mut run = PipelineRun::new("2401.00001");
        run.record(StepOutcome::ok(Stage::Resolve, "resolved"));
        run.record(StepOutcome::degraded(Stage::Metadata, "offline"));

        let err = run.abort(
            Stage::Download,
            Error::Download {
                url: "https://arxiv.org/pdf/2401.00001.pdf".to_string(),
                reason: "HTTP 404 Not Found".to_string(),
            },
        );

        assert_eq!(err.stage(), Some(Stage::Download));
        let log = err.run_log().unwrap();
        assert_eq!(log.len(), 3);
        assert!(log[2].starts_with("[download] failed:"));
    }

    #[tokio::test]
    async fn test_invalid_identifier_fails_at_resolve() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = Arc::new(Config::for_workspace(dir.path()));
        let workspace = Arc::new(WorkspaceStore::open(dir.path()).await.unwrap());
        let pipeline = PaperPipeline::new(config, workspace).unwrap();

        let err = pipeline.process_paper("https://example.org/paper", true).await.unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Resolve));
        assert_eq!(err.run_log().map(<[String]>::len), Some(1));
    }
}
