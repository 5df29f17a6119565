//! # Configuration
//!
//! Layered application configuration. Sources, lowest priority first:
//!
//! 1. Built-in defaults ([`Config::default`])
//! 2. An optional TOML file (`--config` or `ARXIV_MCP_CONFIG`)
//! 3. `ARXIV_MCP_*` environment variables, `__` separating sections
//!    (e.g. `ARXIV_MCP_DOWNLOADS__TIMEOUT_SECS=60`)
//! 4. `WORK_DIR`, kept for compatibility with existing deployments
//! 5. Command-line overrides ([`ConfigOverrides`])
//!
//! The resulting [`Config`] is built once at startup and shared by reference
//! with every component.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

const ENV_PREFIX: &str = "ARXIV_MCP";
const LEGACY_WORK_DIR_ENV: &str = "WORK_DIR";

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub workspace: WorkspaceConfig,
    pub arxiv: ArxivConfig,
    pub downloads: DownloadConfig,
    pub extraction: ExtractionConfig,
    pub logging: LoggingConfig,
}

/// Where cached artifacts live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Root directory for PDFs and extracted text
    pub root: PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        let root = dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("arxiv-research-mcp")
            .join("workspace");
        Self { root }
    }
}

/// arXiv catalog endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArxivConfig {
    /// Atom query API
    pub api_url: String,
    /// Base used to build PDF URLs for bare identifiers
    pub pdf_base_url: String,
    /// Metadata request timeout
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Upper bound applied to search result counts
    pub max_results_cap: u32,
}

impl Default for ArxivConfig {
    fn default() -> Self {
        Self {
            api_url: "http://export.arxiv.org/api/query".to_string(),
            pdf_base_url: crate::client::DEFAULT_PDF_BASE_URL.to_string(),
            timeout_secs: 30,
            user_agent: "arxiv-research-mcp/0.1.0 (Academic Research Tool)".to_string(),
            max_results_cap: 100,
        }
    }
}

/// PDF download behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Whole-request timeout for a PDF download
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Report progress each time this many bytes are crossed
    pub progress_step_bytes: u64,
    /// Report progress each time the percentage advances by this much
    pub progress_step_percent: u8,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            connect_timeout_secs: 10,
            progress_step_bytes: 1024 * 1024,
            progress_step_percent: 5,
        }
    }
}

/// Text extraction thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Minimum characters of normalized text for an extraction to count
    pub min_text_chars: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self { min_text_chars: 100 }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Values supplied on the command line, applied last
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub work_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
}

impl Config {
    /// Load configuration from defaults, an optional file and the environment
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let defaults = Self::default();

        let mut builder = ::config::Config::builder()
            .set_default(
                "workspace.root",
                defaults.workspace.root.to_string_lossy().to_string(),
            )?
            .set_default("arxiv.api_url", defaults.arxiv.api_url.clone())?
            .set_default("arxiv.pdf_base_url", defaults.arxiv.pdf_base_url.clone())?
            .set_default("arxiv.timeout_secs", defaults.arxiv.timeout_secs)?
            .set_default("arxiv.user_agent", defaults.arxiv.user_agent.clone())?
            .set_default("arxiv.max_results_cap", defaults.arxiv.max_results_cap)?
            .set_default("downloads.timeout_secs", defaults.downloads.timeout_secs)?
            .set_default(
                "downloads.connect_timeout_secs",
                defaults.downloads.connect_timeout_secs,
            )?
            .set_default(
                "downloads.progress_step_bytes",
                defaults.downloads.progress_step_bytes,
            )?
            .set_default(
                "downloads.progress_step_percent",
                u64::from(defaults.downloads.progress_step_percent),
            )?
            .set_default(
                "extraction.min_text_chars",
                defaults.extraction.min_text_chars as u64,
            )?
            .set_default("logging.level", defaults.logging.level.clone())?
            .set_default("logging.format", "pretty")?;

        if let Some(path) = file {
            debug!("Loading configuration file: {:?}", path);
            builder = builder.add_source(::config::File::from(path).required(true));
        }

        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(work_dir) = std::env::var_os(LEGACY_WORK_DIR_ENV).filter(|v| !v.is_empty()) {
            builder = builder.set_override(
                "workspace.root",
                PathBuf::from(work_dir).to_string_lossy().to_string(),
            )?;
        }

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply command-line overrides and re-validate
    pub fn with_overrides(mut self, overrides: &ConfigOverrides) -> Result<Self> {
        if let Some(work_dir) = &overrides.work_dir {
            self.workspace.root.clone_from(work_dir);
        }
        if let Some(level) = &overrides.log_level {
            self.logging.level.clone_from(level);
        }
        if let Some(format) = overrides.log_format {
            self.logging.format = format;
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject configurations no component can work with
    pub fn validate(&self) -> Result<()> {
        if self.workspace.root.as_os_str().is_empty() {
            return Err(invalid("workspace.root", "workspace root must be set"));
        }
        for (field, value) in [
            ("arxiv.api_url", &self.arxiv.api_url),
            ("arxiv.pdf_base_url", &self.arxiv.pdf_base_url),
        ] {
            url::Url::parse(value)
                .map_err(|e| invalid(field, &format!("invalid URL '{value}': {e}")))?;
        }
        if self.arxiv.timeout_secs == 0 {
            return Err(invalid("arxiv.timeout_secs", "must be greater than zero"));
        }
        if self.arxiv.max_results_cap == 0 {
            return Err(invalid("arxiv.max_results_cap", "must be greater than zero"));
        }
        if self.downloads.timeout_secs == 0 {
            return Err(invalid("downloads.timeout_secs", "must be greater than zero"));
        }
        if self.downloads.progress_step_bytes == 0 {
            return Err(invalid(
                "downloads.progress_step_bytes",
                "must be greater than zero",
            ));
        }
        if self.downloads.progress_step_percent == 0 || self.downloads.progress_step_percent > 100
        {
            return Err(invalid(
                "downloads.progress_step_percent",
                "must be between 1 and 100",
            ));
        }
        if self.extraction.min_text_chars == 0 {
            return Err(invalid(
                "extraction.min_text_chars",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Configuration rooted at the given workspace, defaults elsewhere
    #[must_use]
    pub fn for_workspace(root: impl Into<PathBuf>) -> Self {
        Self {
            workspace: WorkspaceConfig { root: root.into() },
            ..Self::default()
        }
    }
}

fn invalid(field: &str, reason: &str) -> Error {
    Error::InvalidConfig {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
