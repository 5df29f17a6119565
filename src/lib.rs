//! # arxiv-research-mcp
//!
//! Fetch arXiv metadata and PDFs, extract plain text, and cache every
//! intermediate artifact on disk so repeated requests stay cheap.
//!
//! The pipeline is exposed as a library ([`PaperPipeline`] and its parts)
//! and as an MCP server over stdio ([`Server`]).

pub mod client;
pub mod config;
pub mod error;
pub mod repositories;
pub mod server;
pub mod tools;

pub use client::{normalize, PaperIdentifier, PaperMetadata, SearchResults};
pub use config::{Config, ConfigOverrides, LogFormat};
pub use error::{Error, Result, Stage};
pub use repositories::{ArtifactKind, ClearReport, WorkspaceStore};
pub use server::Server;
pub use tools::{PaperPipeline, PdfDownloader, PipelineRun, SearchTool, TextExtractor};
