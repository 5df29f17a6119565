use crate::client::{HttpClientConfig, PaperIdentifier};
use crate::repositories::{ArtifactKind, WorkspaceStore};
use crate::{Config, Error, Result};
use futures::{Stream, StreamExt};
use reqwest::Client;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

const PDF_MAGIC: &[u8] = b"%PDF";

/// Input parameters for the PDF download tool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DownloadInput {
    /// arXiv identifier (`2401.00001`, `2401.00001v2`) or abstract-page URL
    pub paper_id: String,
}

/// Progress information for a download
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DownloadProgress {
    /// URL being downloaded
    pub source: String,
    /// Final artifact path
    pub file_path: PathBuf,
    /// Downloaded bytes so far
    pub downloaded: u64,
    /// Total file size in bytes (if the server sent a length)
    pub total_size: Option<u64>,
    /// Download percentage (0-100), when the total is known
    pub percentage: Option<f64>,
}

/// Result of a download request
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DownloadOutcome {
    /// Path of the PDF artifact
    pub path: PathBuf,
    /// Whether the artifact was already in the workspace
    pub cached: bool,
    /// File size in bytes
    pub bytes: u64,
    /// SHA-256 of the downloaded body; not recomputed for cache hits
    pub sha256: Option<String>,
}

/// Progress callback type
pub type ProgressCallback = Arc<dyn Fn(DownloadProgress) + Send + Sync>;

/// Callback that reports progress through `tracing`
#[must_use]
pub fn log_progress() -> ProgressCallback {
    Arc::new(|progress: DownloadProgress| match progress.percentage {
        Some(pct) => info!(
            "Downloading {}: {:.1}% ({} bytes)",
            progress.source, pct, progress.downloaded
        ),
        None => info!(
            "Downloading {}: {} bytes",
            progress.source, progress.downloaded
        ),
    })
}

/// Decides when a progress report is due
///
/// A report fires when the byte count crosses a multiple of `step_bytes` or
/// the percentage has advanced by at least `step_percent` since the last one.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    step_bytes: u64,
    step_percent: u8,
    total: Option<u64>,
    downloaded: u64,
    last_bucket: u64,
    last_percent: u64,
}

impl ProgressTracker {
    #[must_use]
    pub fn new(step_bytes: u64, step_percent: u8, total: Option<u64>) -> Self {
        Self {
            step_bytes: step_bytes.max(1),
            step_percent: step_percent.max(1),
            total: total.filter(|t| *t > 0),
            downloaded: 0,
            last_bucket: 0,
            last_percent: 0,
        }
    }

    /// Record `len` more bytes; returns true when a report is due
    pub fn advance(&mut self, len: u64) -> bool {
        self.downloaded += len;

        let bucket = self.downloaded / self.step_bytes;
        let crossed_boundary = bucket > self.last_bucket;

        let percent = self.whole_percent();
        let advanced = percent >= self.last_percent + u64::from(self.step_percent);

        if crossed_boundary || advanced {
            self.last_bucket = bucket;
            self.last_percent = percent;
            true
        } else {
            false
        }
    }

    #[must_use]
    pub const fn downloaded(&self) -> u64 {
        self.downloaded
    }

    #[must_use]
    pub const fn total(&self) -> Option<u64> {
        self.total
    }

    /// Percentage complete, when the total is known
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percentage(&self) -> Option<f64> {
        self.total
            .map(|t| (self.downloaded as f64 / t as f64 * 100.0).min(100.0))
    }

    fn whole_percent(&self) -> u64 {
        self.total
            .map_or(0, |t| (self.downloaded.saturating_mul(100) / t).min(100))
    }
}

/// Streaming PDF downloader backed by the workspace cache
#[derive(Clone)]
pub struct PdfDownloader {
    http_client: Client,
    workspace: Arc<WorkspaceStore>,
    config: Arc<Config>,
    progress_callback: ProgressCallback,
}

impl std::fmt::Debug for PdfDownloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfDownloader")
            .field("workspace", &self.workspace.root())
            .field("timeout_secs", &self.config.downloads.timeout_secs)
            .finish_non_exhaustive()
    }
}

impl PdfDownloader {
    /// Create a new downloader
    pub fn new(config: Arc<Config>, workspace: Arc<WorkspaceStore>) -> Result<Self> {
        info!("Initializing PDF downloader");

        let http_client = HttpClientConfig {
            timeout: Duration::from_secs(config.downloads.timeout_secs),
            connect_timeout: Duration::from_secs(config.downloads.connect_timeout_secs),
            user_agent: config.arxiv.user_agent.clone(),
            ..HttpClientConfig::default()
        }
        .build()?;

        Ok(Self {
            http_client,
            workspace,
            config,
            progress_callback: log_progress(),
        })
    }

    /// Replace the progress callback
    #[must_use]
    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = callback;
        self
    }

    /// Resolve user input and fetch its PDF
    pub async fn download(&self, input: &str) -> Result<DownloadOutcome> {
        let id = PaperIdentifier::parse(input, &self.config.arxiv.pdf_base_url)?;
        self.fetch_pdf(&id).await
    }

    /// Fetch the PDF for an identifier, reusing the cached artifact if present
    #[instrument(skip(self), fields(id = %id.normalized_id, url = %id.derived_pdf_url))]
    pub async fn fetch_pdf(&self, id: &PaperIdentifier) -> Result<DownloadOutcome> {
        let key = id.normalized_id.as_str();

        if let Some(outcome) = self.cached(key).await? {
            return Ok(outcome);
        }

        let _guard = self.workspace.lock(key, ArtifactKind::Pdf).await;
        // a concurrent caller may have finished while we waited
        if let Some(outcome) = self.cached(key).await? {
            return Ok(outcome);
        }

        let url = &id.derived_pdf_url;
        info!("Downloading PDF from {}", url);
        let start = Instant::now();

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| download_error(url, &request_failure(&e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(download_error(url, &format!("HTTP {status}")));
        }

        let total = response.content_length();
        debug!("Expected size: {:?}", total);

        let (path, bytes, sha256) = self
            .stream_to_workspace(key, url, total, response.bytes_stream())
            .await?;

        info!(
            "Downloaded {} ({} bytes) in {:?}",
            path.display(),
            bytes,
            start.elapsed()
        );
        Ok(DownloadOutcome {
            path,
            cached: false,
            bytes,
            sha256: Some(sha256),
        })
    }

    async fn cached(&self, key: &str) -> Result<Option<DownloadOutcome>> {
        if !self.workspace.exists(key, ArtifactKind::Pdf).await? {
            return Ok(None);
        }
        let path = self.workspace.path(key, ArtifactKind::Pdf);
        let bytes = tokio::fs::metadata(&path)
            .await
            .map_err(|e| Error::cache_io(&path, e))?
            .len();
        debug!("PDF already cached at {:?}", path);
        Ok(Some(DownloadOutcome {
            path,
            cached: true,
            bytes,
            sha256: None,
        }))
    }

    /// Write a body stream to a staging file and commit it as the PDF artifact
    ///
    /// On any failure the staging file is removed and nothing appears at the
    /// artifact path.
    pub async fn stream_to_workspace<S, B, E>(
        &self,
        key: &str,
        source: &str,
        total: Option<u64>,
        stream: S,
    ) -> Result<(PathBuf, u64, String)>
    where
        S: Stream<Item = std::result::Result<B, E>>,
        B: AsRef<[u8]>,
        E: std::fmt::Display,
    {
        let temp = self.workspace.temp_path(key, ArtifactKind::Pdf);
        let target = self.workspace.path(key, ArtifactKind::Pdf);

        match self.write_body(&temp, &target, source, total, stream).await {
            Ok((bytes, sha256)) => {
                let path = self.workspace.commit(&temp, key, ArtifactKind::Pdf).await?;
                Ok((path, bytes, sha256))
            }
            Err(e) => {
                warn!("Download of {} failed: {}", source, e);
                self.workspace.discard(&temp).await;
                Err(e)
            }
        }
    }

    async fn write_body<S, B, E>(
        &self,
        temp: &Path,
        target: &Path,
        source: &str,
        total: Option<u64>,
        stream: S,
    ) -> Result<(u64, String)>
    where
        S: Stream<Item = std::result::Result<B, E>>,
        B: AsRef<[u8]>,
        E: std::fmt::Display,
    {
        let mut stream = std::pin::pin!(stream);
        let mut file = File::create(temp)
            .await
            .map_err(|e| download_error(source, &format!("cannot create staging file: {e}")))?;

        let mut tracker = ProgressTracker::new(
            self.config.downloads.progress_step_bytes,
            self.config.downloads.progress_step_percent,
            total,
        );
        let mut hasher = Sha256::new();
        let mut header = Vec::with_capacity(PDF_MAGIC.len());

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| download_error(source, &format!("stream error: {e}")))?;
            let chunk = chunk.as_ref();
            if chunk.is_empty() {
                continue;
            }

            if header.len() < PDF_MAGIC.len() {
                let take = (PDF_MAGIC.len() - header.len()).min(chunk.len());
                header.extend_from_slice(&chunk[..take]);
                if header.len() == PDF_MAGIC.len() && header != PDF_MAGIC {
                    return Err(download_error(source, "response is not a PDF"));
                }
            }

            file.write_all(chunk)
                .await
                .map_err(|e| download_error(source, &format!("write failed: {e}")))?;
            hasher.update(chunk);

            if tracker.advance(chunk.len() as u64) {
                self.report(source, target, &tracker);
            }
        }

        if tracker.downloaded() == 0 {
            return Err(download_error(source, "empty response body"));
        }
        if header != PDF_MAGIC {
            return Err(download_error(source, "response is not a PDF"));
        }

        file.flush()
            .await
            .map_err(|e| download_error(source, &format!("flush failed: {e}")))?;
        file.sync_all()
            .await
            .map_err(|e| download_error(source, &format!("sync failed: {e}")))?;

        self.report(source, target, &tracker);
        Ok((tracker.downloaded(), format!("{:x}", hasher.finalize())))
    }

    fn report(&self, source: &str, target: &Path, tracker: &ProgressTracker) {
        (self.progress_callback)(DownloadProgress {
            source: source.to_string(),
            file_path: target.to_path_buf(),
            downloaded: tracker.downloaded(),
            total_size: tracker.total(),
            percentage: tracker.percentage(),
        });
    }
}

fn request_failure(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "request timed out".to_string()
    } else if e.is_connect() {
        format!("connection failed: {e}")
    } else {
        format!("request failed: {e}")
    }
}

fn download_error(url: &str, reason: &str) -> Error {
    Error::Download {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    async fn downloader() -> (TempDir, PdfDownloader) {
        let dir = TempDir::new().unwrap();
        let config = Arc::new(Config::for_workspace(dir.path()));
        let workspace = Arc::new(WorkspaceStore::open(dir.path()).await.unwrap());
        (dir, PdfDownloader::new(config, workspace).unwrap())
    }

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_progress_every_megabyte_without_total() {
        let mut tracker = ProgressTracker::new(1024 * 1024, 5, None);
        let chunk = 256 * 1024;
        let fired: Vec<bool> = (0..8).map(|_| tracker.advance(chunk)).collect();
        assert_eq!(
            fired,
            vec![false, false, false, true, false, false, false, true]
        );
        assert_eq!(tracker.percentage(), None);
    }

    #[test]
    fn test_progress_every_five_percent() {
        let mut tracker = ProgressTracker::new(u64::MAX, 5, Some(1000));
        let mut reports = 0;
        for _ in 0..100 {
            if tracker.advance(10) {
                reports += 1;
            }
        }
        assert_eq!(reports, 20);
        assert_eq!(tracker.percentage(), Some(100.0));
    }

    #[tokio::test]
    async fn test_stream_commits_pdf() {
        let (dir, downloader) = downloader().await;
        let chunks: Vec<std::result::Result<Vec<u8>, std::io::Error>> =
            vec![Ok(b"%P".to_vec()), Ok(b"DF-1.4 body".to_vec())];

        let (path, bytes, sha) = downloader
            .stream_to_workspace("2401.00001", "test", Some(13), futures::stream::iter(chunks))
            .await
            .unwrap();

        assert_eq!(path.file_name().unwrap(), "2401.00001.pdf");
        assert_eq!(bytes, 13);
        assert_eq!(sha.len(), 64);
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.4 body");
        assert_eq!(entries(dir.path()), 1);
    }

    #[tokio::test]
    async fn test_stream_error_leaves_nothing_behind() {
        let (dir, downloader) = downloader().await;
        let chunks: Vec<std::result::Result<Vec<u8>, std::io::Error>> = vec![
            Ok(b"%PDF-1.4 partial".to_vec()),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ];

        let err = downloader
            .stream_to_workspace("2401.00001", "test", None, futures::stream::iter(chunks))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Download { .. }));
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_non_pdf_and_empty_bodies_are_rejected() {
        let (dir, downloader) = downloader().await;

        let html: Vec<std::result::Result<&[u8], std::io::Error>> = vec![Ok(&b"<html>nope</html>"[..])];
        let err = downloader
            .stream_to_workspace("a", "test", None, futures::stream::iter(html))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not a PDF"));

        let empty: Vec<std::result::Result<&[u8], std::io::Error>> = vec![];
        let err = downloader
            .stream_to_workspace("a", "test", None, futures::stream::iter(empty))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty"));

        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_progress_callback_sees_completion() {
        let (_dir, downloader) = downloader().await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let downloader = downloader.with_progress_callback(Arc::new(move |p| {
            sink.lock().unwrap().push(p.downloaded);
        }));

        let chunks: Vec<std::result::Result<Vec<u8>, std::io::Error>> =
            vec![Ok(b"%PDF".to_vec()), Ok(vec![0u8; 96])];
        downloader
            .stream_to_workspace("b", "test", Some(100), futures::stream::iter(chunks))
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.last(), Some(&100));
    }

    #[tokio::test]
    async fn test_cached_pdf_skips_network() {
        let (_dir, downloader) = downloader().await;
        downloader
            .workspace
            .write("2401.00002", ArtifactKind::Pdf, b"%PDF-1.4")
            .await
            .unwrap();

        // port 9 is never served; a network attempt would fail
        let id = PaperIdentifier::parse("2401.00002v3", "http://127.0.0.1:9/pdf").unwrap();
        let outcome = downloader.fetch_pdf(&id).await.unwrap();
        assert!(outcome.cached);
        assert_eq!(outcome.bytes, 8);
        assert!(outcome.sha256.is_none());
    }
}
