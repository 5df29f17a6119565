use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline stage an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Resolve,
    Metadata,
    Download,
    Extract,
    Summary,
}

impl Stage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Resolve => "resolve",
            Self::Metadata => "metadata",
            Self::Download => "download",
            Self::Extract => "extract",
            Self::Summary => "summary",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error taxonomy for the paper-processing pipeline
#[derive(Error, Debug)]
pub enum Error {
    // Input errors (permanent, no I/O attempted)
    #[error("Invalid identifier '{input}': {reason}")]
    InvalidIdentifier { input: String, reason: String },

    #[error("Invalid input: {field} - {reason}")]
    InvalidInput { field: String, reason: String },

    // Configuration errors (permanent failures)
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },

    // Metadata lookup (the only non-fatal stage)
    #[error("Metadata lookup failed: {0}")]
    UpstreamMetadata(String),

    // PDF acquisition
    #[error("PDF download failed for {url}: {reason}")]
    Download { url: String, reason: String },

    #[error("PDF not found at {}; download it first", path.display())]
    MissingPdf { path: PathBuf },

    // Text extraction
    #[error("Extracted text too short: {chars} characters (minimum {min}); the PDF may be a scan without a text layer")]
    ExtractionTooShort { chars: usize, min: usize },

    #[error("PDF text extraction failed for {}: {reason}", path.display())]
    Extraction { path: PathBuf, reason: String },

    // Workspace filesystem errors
    #[error("Cache I/O error on {}: {source}", path.display())]
    CacheIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Orchestrator wrapper carrying the truncated run log
    #[error("{stage} stage failed: {source}")]
    Pipeline {
        stage: Stage,
        log: Vec<String>,
        #[source]
        source: Box<Error>,
    },

    // Service plumbing
    #[error("Service error: {0}")]
    Service(String),
}

impl Error {
    /// Build a cache I/O error for the given path
    pub fn cache_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::CacheIo {
            path: path.into(),
            source,
        }
    }

    /// Stage this error is naturally attributed to
    #[must_use]
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::InvalidIdentifier { .. } => Some(Stage::Resolve),
            Self::UpstreamMetadata(_) => Some(Stage::Metadata),
            Self::Download { .. } => Some(Stage::Download),
            Self::MissingPdf { .. } | Self::ExtractionTooShort { .. } | Self::Extraction { .. } => {
                Some(Stage::Extract)
            }
            Self::Pipeline { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Whether this error aborts a pipeline run
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::UpstreamMetadata(_))
    }

    /// Run log captured before a fatal pipeline failure
    #[must_use]
    pub fn run_log(&self) -> Option<&[String]> {
        match self {
            Self::Pipeline { log, .. } => Some(log),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<crate::client::providers::ProviderError> for Error {
    fn from(err: crate::client::providers::ProviderError) -> Self {
        Self::UpstreamMetadata(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_metadata_errors_are_non_fatal() {
        assert!(!Error::UpstreamMetadata("offline".to_string()).is_fatal());
        assert!(Error::MissingPdf {
            path: PathBuf::from("/tmp/x.pdf")
        }
        .is_fatal());
        assert!(Error::ExtractionTooShort { chars: 3, min: 100 }.is_fatal());
    }

    #[test]
    fn test_pipeline_error_is_stage_tagged() {
        let err = Error::Pipeline {
            stage: Stage::Download,
            log: vec!["step 1".to_string()],
            source: Box::new(Error::Download {
                url: "https://arxiv.org/pdf/1.pdf".to_string(),
                reason: "HTTP 404".to_string(),
            }),
        };

        assert_eq!(err.stage(), Some(Stage::Download));
        assert_eq!(err.run_log().map(<[String]>::len), Some(1));
        assert!(err.to_string().starts_with("download stage failed:"));
    }
}
