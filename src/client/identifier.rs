use crate::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use url::Url;

/// PDF host used for bare identifiers unless configured otherwise
pub const DEFAULT_PDF_BASE_URL: &str = "https://arxiv.org/pdf";

const ABSTRACT_SEGMENT: &str = "/abs/";
const PDF_SEGMENT: &str = "/pdf/";

fn version_suffix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"v\d+$").expect("static regex"))
}

// '_' excluded: artifact names map '/' to '_'
fn identifier_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9./-]+$").expect("static regex"))
}

/// An arXiv identifier resolved from user input
///
/// `raw_id` keeps any version suffix and is what metadata queries use;
/// `normalized_id` drops it and keys every cached artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaperIdentifier {
    pub raw_input: String,
    pub raw_id: String,
    pub normalized_id: String,
    pub is_url: bool,
    pub derived_pdf_url: String,
}

impl PaperIdentifier {
    /// Resolve against the default arXiv PDF host
    pub fn resolve(input: &str) -> Result<Self> {
        Self::parse(input, DEFAULT_PDF_BASE_URL)
    }

    /// Resolve a bare identifier or an abstract-page URL
    pub fn parse(input: &str, pdf_base_url: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid(input, "identifier cannot be empty"));
        }

        let is_url = trimmed.starts_with("http://") || trimmed.starts_with("https://");
        let (raw_id, derived_pdf_url) = if is_url {
            Self::from_url(trimmed)?
        } else {
            let id = trimmed.to_string();
            Self::validate_id(trimmed, &id)?;
            let pdf_url = format!("{}/{id}.pdf", pdf_base_url.trim_end_matches('/'));
            (id, pdf_url)
        };

        let normalized_id = normalize(&raw_id);
        if normalized_id.is_empty() {
            return Err(invalid(input, "identifier is only a version marker"));
        }

        Ok(Self {
            raw_input: input.to_string(),
            raw_id,
            normalized_id,
            is_url,
            derived_pdf_url,
        })
    }

    fn from_url(input: &str) -> Result<(String, String)> {
        let mut url = Url::parse(input).map_err(|e| invalid(input, &format!("invalid URL: {e}")))?;

        let path = url.path().to_string();
        let Some(start) = path.find(ABSTRACT_SEGMENT) else {
            return Err(invalid(
                input,
                "URL has no '/abs/' segment to derive a PDF link from",
            ));
        };

        let id = path[start + ABSTRACT_SEGMENT.len()..]
            .trim_end_matches('/')
            .to_string();
        Self::validate_id(input, &id)?;

        let pdf_path = format!(
            "{}{PDF_SEGMENT}{id}.pdf",
            &path[..start]
        );
        url.set_path(&pdf_path);
        url.set_query(None);
        url.set_fragment(None);

        Ok((id, url.to_string()))
    }

    fn validate_id(input: &str, id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(invalid(input, "no identifier found"));
        }
        if !identifier_chars().is_match(id) {
            return Err(invalid(input, "identifier contains unsupported characters"));
        }
        if id.starts_with('.') || id.starts_with('/') || id.contains("..") {
            return Err(invalid(input, "identifier is not a catalog id"));
        }
        Ok(())
    }

    /// Version suffix of the raw identifier, if any (`"v2"`)
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.raw_id.strip_prefix(&self.normalized_id).filter(|v| !v.is_empty())
    }
}

impl std::fmt::Display for PaperIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw_id)
    }
}

/// Strip a trailing `vN` version marker
#[must_use]
pub fn normalize(id: &str) -> String {
    version_suffix().replace(id, "").into_owned()
}

fn invalid(input: &str, reason: &str) -> Error {
    Error::InvalidIdentifier {
        input: input.to_string(),
        reason: reason.to_string(),
    }
}
