use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tempfile::{NamedTempFile, TempPath};

use crate::error::StorageError;
use crate::path::ArtifactPath;

/// Maps artifact paths to files on disk beneath a single root directory.
/// Publication is atomic: the full body is written to a temp file first and
/// only then renamed into place, so readers never observe a partially
/// written artifact (C1, §4.1).
#[derive(Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn location(&self, path: &ArtifactPath) -> PathBuf {
        self.root.join(path.to_relative_path())
    }

    /// Opens the cached file for `path`, or returns `None` if it isn't
    /// cached or isn't readable. Never fails outright; an unreadable path is
    /// treated the same as a miss.
    pub async fn find(&self, path: &ArtifactPath) -> Option<tokio::fs::File> {
        tokio::fs::File::open(self.location(path)).await.ok()
    }

    /// Stat-only lookup used by the Request Bridge's store-hit fast path, so
    /// it doesn't need to open the file just to decide whether one exists.
    pub async fn stat(&self, path: &ArtifactPath) -> Option<std::fs::Metadata> {
        tokio::fs::metadata(self.location(path)).await.ok()
    }

    /// Atomically promotes a temp file (already fully written, e.g. by an
    /// Upstream Fetch) into the store at `path`. If `last_modified` is
    /// given, the promoted file's mtime is set to it, truncated to whole
    /// seconds to match what `Last-Modified`/`If-Modified-Since` can
    /// represent.
    pub async fn publish_temp_file(
        &self,
        path: &ArtifactPath,
        temp: TempPath,
        last_modified: Option<SystemTime>,
    ) -> Result<PathBuf, StorageError> {
        let location = self.location(path);
        if let Some(parent) = location.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StorageError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let dest = location.clone();
        tokio::task::spawn_blocking(move || persist_or_copy(temp, &dest))
            .await
            .expect("publish blocking task panicked")
            .map_err(|source| StorageError::Persist {
                path: location.clone(),
                source,
            })?;

        if let Some(mtime) = last_modified {
            let truncated = truncate_to_secs(mtime);
            let dest = location.clone();
            tokio::task::spawn_blocking(move || {
                let file = std::fs::File::open(&dest)?;
                file.set_modified(truncated)
            })
            .await
            .expect("set_modified blocking task panicked")
            .map_err(|source| StorageError::SetTimes {
                path: location.clone(),
                source,
            })?;
        }

        Ok(location)
    }

    /// In-memory variant of publish, used by tests and by any future
    /// non-streamed producer: writes `bytes` to a fresh temp file on the
    /// store's own filesystem, then promotes it exactly like
    /// [`Self::publish_temp_file`].
    pub async fn publish_bytes(
        &self,
        path: &ArtifactPath,
        bytes: &[u8],
        last_modified: Option<SystemTime>,
    ) -> Result<PathBuf, StorageError> {
        let root = self.root.clone();
        let bytes = bytes.to_vec();
        let temp_path = tokio::task::spawn_blocking(move || -> Result<TempPath, StorageError> {
            std::fs::create_dir_all(&root).map_err(|source| StorageError::CreateDir {
                path: root.clone(),
                source,
            })?;
            let mut file = NamedTempFile::new_in(&root).map_err(|source| StorageError::Write {
                path: root.clone(),
                source,
            })?;
            use std::io::Write;
            file.write_all(&bytes).map_err(|source| StorageError::Write {
                path: root.clone(),
                source,
            })?;
            Ok(file.into_temp_path())
        })
        .await
        .expect("publish_bytes blocking task panicked")?;

        self.publish_temp_file(path, temp_path, last_modified).await
    }
}

/// Temp files created for an Upstream Fetch live in the OS temp directory,
/// which is not always on the same filesystem as the store root; rename
/// then fails with `EXDEV`. Fall back to copy+remove in that case rather
/// than surfacing a spurious storage error.
fn persist_or_copy(temp: TempPath, dest: &Path) -> std::io::Result<()> {
    match temp.persist(dest) {
        Ok(_) => Ok(()),
        Err(err) => {
            std::fs::copy(&err.path, dest)?;
            Ok(())
            // err.path drops here, deleting the leftover temp file.
        }
    }
}

fn truncate_to_secs(t: SystemTime) -> SystemTime {
    let secs = t
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    std::time::UNIX_EPOCH + std::time::Duration::from_secs(secs)
}
