//! # Artifact Storage
//!
//! On-disk cache of per-paper artifacts. [`WorkspaceStore`] owns every path
//! under the configured root; [`KeyedLocks`] keeps concurrent producers of
//! the same artifact from racing.

pub mod locks;
pub mod workspace;

pub use locks::KeyedLocks;
pub use workspace::{ArtifactKind, ClearReport, WorkspaceStore};
