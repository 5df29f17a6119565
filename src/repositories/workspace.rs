//! # Workspace Store
//!
//! Maps `(normalized identifier, artifact kind)` to a deterministic file
//! under the configured root. Every write and delete of an artifact goes
//! through this type so path derivation stays in one place.
//!
//! Writes are staged in a hidden `.part` sibling and renamed into place, so
//! readers never observe a truncated artifact.

use super::locks::KeyedLocks;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, instrument, warn};

const TEMP_SUFFIX: &str = ".part";

/// Kinds of cached artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Pdf,
    Text,
    /// Translated Markdown produced downstream; only ever read here
    TranslatedMarkdown,
}

impl ArtifactKind {
    #[must_use]
    pub const fn file_suffix(self) -> &'static str {
        match self {
            Self::Pdf => ".pdf",
            Self::Text => "_text.txt",
            Self::TranslatedMarkdown => "_md_zh.md",
        }
    }
}

/// Files removed by [`WorkspaceStore::clear_all`]
#[derive(Debug, Clone, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ClearReport {
    pub removed: Vec<PathBuf>,
    pub message: String,
}

/// Artifact storage rooted at a single directory
#[derive(Debug)]
pub struct WorkspaceStore {
    root: PathBuf,
    locks: KeyedLocks<(String, ArtifactKind)>,
}

impl WorkspaceStore {
    /// Open the workspace, creating the root directory if needed
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|e| Error::cache_io(root, e))?;
        let root = tokio::fs::canonicalize(root)
            .await
            .map_err(|e| Error::cache_io(root, e))?;

        let metadata = tokio::fs::metadata(&root)
            .await
            .map_err(|e| Error::cache_io(&root, e))?;
        if metadata.permissions().readonly() {
            return Err(Error::cache_io(
                &root,
                std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "workspace root is read-only",
                ),
            ));
        }

        info!("Using workspace root: {:?}", root);
        Ok(Self {
            root,
            locks: KeyedLocks::new(),
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File name for an artifact; `/` in old-style ids is flattened to `_`
    #[must_use]
    pub fn file_name(normalized_id: &str, kind: ArtifactKind) -> String {
        format!("{}{}", normalized_id.replace('/', "_"), kind.file_suffix())
    }

    /// Deterministic artifact path
    #[must_use]
    pub fn path(&self, normalized_id: &str, kind: ArtifactKind) -> PathBuf {
        self.root.join(Self::file_name(normalized_id, kind))
    }

    pub async fn exists(&self, normalized_id: &str, kind: ArtifactKind) -> Result<bool> {
        let path = self.path(normalized_id, kind);
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| Error::cache_io(path, e))
    }

    pub async fn read_to_string(&self, normalized_id: &str, kind: ArtifactKind) -> Result<String> {
        let path = self.path(normalized_id, kind);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| Error::cache_io(path, e))
    }

    /// Hold exclusive access to one artifact while it is produced
    pub async fn lock(&self, normalized_id: &str, kind: ArtifactKind) -> OwnedMutexGuard<()> {
        self.locks.acquire((normalized_id.to_string(), kind)).await
    }

    /// Fresh staging path next to the final artifact
    #[must_use]
    pub fn temp_path(&self, normalized_id: &str, kind: ArtifactKind) -> PathBuf {
        self.root.join(format!(
            ".{}.{}{TEMP_SUFFIX}",
            Self::file_name(normalized_id, kind),
            uuid::Uuid::new_v4().simple()
        ))
    }

    /// Atomically move a staged file into its final place
    pub async fn commit(&self, temp: &Path, normalized_id: &str, kind: ArtifactKind) -> Result<PathBuf> {
        let target = self.path(normalized_id, kind);
        if let Err(e) = tokio::fs::rename(temp, &target).await {
            self.discard(temp).await;
            return Err(Error::cache_io(&target, e));
        }
        debug!("Committed artifact {:?}", target);
        Ok(target)
    }

    /// Remove a staged file, ignoring one that was never created
    pub async fn discard(&self, temp: &Path) {
        match tokio::fs::remove_file(temp).await {
            Ok(()) => debug!("Removed partial file {:?}", temp),
            Err(e) if is_gone(&e) => {}
            Err(e) => warn!("Failed to remove partial file {:?}: {}", temp, e),
        }
    }

    /// Write an artifact via a staged file and rename
    #[instrument(skip(self, data), fields(bytes = data.len()))]
    pub async fn write(&self, normalized_id: &str, kind: ArtifactKind, data: &[u8]) -> Result<PathBuf> {
        let temp = self.temp_path(normalized_id, kind);
        if let Err(e) = write_synced(&temp, data).await {
            self.discard(&temp).await;
            return Err(Error::cache_io(&temp, e));
        }
        self.commit(&temp, normalized_id, kind).await
    }

    /// Delete every file below the root, keeping the root itself
    ///
    /// Symlinks are removed, never followed. Emptied sub-directories are
    /// removed too.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub async fn clear_all(&self) -> Result<ClearReport> {
        let mut removed = Vec::new();
        let mut dirs = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if is_gone(&e) && dir != self.root => continue,
                Err(e) => return Err(Error::cache_io(&dir, e)),
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| Error::cache_io(&dir, e))?
            {
                let path = entry.path();
                let file_type = match entry.file_type().await {
                    Ok(file_type) => file_type,
                    Err(e) if is_gone(&e) => continue,
                    Err(e) => return Err(Error::cache_io(&path, e)),
                };

                if file_type.is_dir() {
                    dirs.push(path.clone());
                    pending.push(path);
                    continue;
                }

                match tokio::fs::remove_file(&path).await {
                    Ok(()) => {
                        debug!("Removed {:?}", path);
                        removed.push(path);
                    }
                    // a concurrent clear or commit got there first
                    Err(e) if is_gone(&e) => {}
                    Err(e) => return Err(Error::cache_io(&path, e)),
                }
            }
        }

        // deepest first so parents are empty by the time we reach them
        dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));
        for dir in dirs {
            match tokio::fs::remove_dir(&dir).await {
                Ok(()) => {}
                Err(e) if is_gone(&e) => {}
                Err(e) => return Err(Error::cache_io(&dir, e)),
            }
        }

        removed.sort();
        let message = if removed.is_empty() {
            format!("Workspace {} is already empty", self.root.display())
        } else {
            format!(
                "Removed {} file(s) from workspace {}",
                removed.len(),
                self.root.display()
            )
        };
        info!("{}", message);

        Ok(ClearReport { removed, message })
    }
}

fn is_gone(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::NotFound
}

async fn write_synced(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(data).await?;
    file.flush().await?;
    file.sync_all().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn store() -> (TempDir, WorkspaceStore) {
        let dir = TempDir::new().unwrap();
        let store = WorkspaceStore::open(dir.path()).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_paths_are_deterministic() {
        let (_dir, store) = store().await;
        let pdf = store.path("1234.5678", ArtifactKind::Pdf);
        let text = store.path("1234.5678", ArtifactKind::Text);
        let md = store.path("1234.5678", ArtifactKind::TranslatedMarkdown);

        assert_eq!(pdf, store.path("1234.5678", ArtifactKind::Pdf));
        assert_eq!(pdf.file_name().unwrap(), "1234.5678.pdf");
        assert_eq!(text.file_name().unwrap(), "1234.5678_text.txt");
        assert_eq!(md.file_name().unwrap(), "1234.5678_md_zh.md");
        assert_eq!(pdf.parent().unwrap(), store.root());
    }

    #[tokio::test]
    async fn test_old_style_ids_stay_in_root() {
        let (_dir, store) = store().await;
        let path = store.path("hep-th/9901001", ArtifactKind::Pdf);
        assert_eq!(path.parent().unwrap(), store.root());
        assert_eq!(path.file_name().unwrap(), "hep-th_9901001.pdf");
    }

    #[tokio::test]
    async fn test_open_creates_missing_root() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        let store = WorkspaceStore::open(&nested).await.unwrap();
        assert!(store.root().is_dir());
    }

    #[tokio::test]
    async fn test_write_read_and_exists() {
        let (_dir, store) = store().await;
        assert!(!store.exists("2401.00001", ArtifactKind::Text).await.unwrap());

        let path = store
            .write("2401.00001", ArtifactKind::Text, b"hello")
            .await
            .unwrap();

        assert_eq!(path, store.path("2401.00001", ArtifactKind::Text));
        assert!(store.exists("2401.00001", ArtifactKind::Text).await.unwrap());
        assert_eq!(
            store
                .read_to_string("2401.00001", ArtifactKind::Text)
                .await
                .unwrap(),
            "hello"
        );

        // no staging files linger
        let names: Vec<_> = std::fs::read_dir(store.root())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[tokio::test]
    async fn test_clear_all_twice() {
        let (_dir, store) = store().await;
        store.write("a", ArtifactKind::Pdf, b"%PDF").await.unwrap();
        store.write("a", ArtifactKind::Text, b"text").await.unwrap();
        std::fs::create_dir(store.root().join("nested")).unwrap();
        std::fs::write(store.root().join("nested").join("x.txt"), b"x").unwrap();

        let first = store.clear_all().await.unwrap();
        assert_eq!(first.removed.len(), 3);
        assert!(store.root().is_dir());
        assert_eq!(std::fs::read_dir(store.root()).unwrap().count(), 0);

        let second = store.clear_all().await.unwrap();
        assert!(second.removed.is_empty());
        assert!(second.message.contains("already empty"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_clear_all_does_not_follow_symlinks() {
        let outside = TempDir::new().unwrap();
        let keep = outside.path().join("keep.txt");
        std::fs::write(&keep, b"keep").unwrap();

        let (_dir, store) = store().await;
        std::os::unix::fs::symlink(outside.path(), store.root().join("link")).unwrap();

        let report = store.clear_all().await.unwrap();
        assert_eq!(report.removed, vec![store.root().join("link")]);
        assert!(keep.exists());
    }
}
