//! Artifact storage on the local filesystem
//!
//! Artifacts live under `{root}/{owner}/{dataset}/{key}.{ext}`. Writes go to a
//! unique sibling file first and are renamed into place, so a final path only
//! ever holds a complete artifact. Two writers racing on the same key are not
//! coordinated: the last rename wins.

use crate::error::{Result, ThumbError};
use crate::key::CacheKey;
use crate::types::{ArtifactKind, DatasetId};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Trait for artifact persistence
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Location of an artifact
    fn artifact_path(&self, dataset: &DatasetId, kind: ArtifactKind, key: &CacheKey) -> PathBuf;

    /// Check if an artifact exists
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Read a stored artifact
    async fn read(&self, path: &Path) -> Result<Bytes>;

    /// Store an artifact, replacing any previous content
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Create the directory if it is missing
    async fn ensure_directory(&self, path: &Path) -> Result<()>;
}

/// File system artifact store
#[derive(Debug, Clone)]
pub struct FileSystemArtifactStore {
    base_path: PathBuf,
}

impl FileSystemArtifactStore {
    /// Create a new store rooted at `base_path`
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    /// Directory holding every artifact of a dataset
    pub fn dataset_dir(&self, dataset: &DatasetId) -> PathBuf {
        self.base_path.join(&dataset.owner).join(&dataset.dataset)
    }
}

#[async_trait]
impl ArtifactStore for FileSystemArtifactStore {
    fn artifact_path(&self, dataset: &DatasetId, kind: ArtifactKind, key: &CacheKey) -> PathBuf {
        self.dataset_dir(dataset)
            .join(format!("{}.{}", key, kind.extension()))
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(fs::try_exists(path).await?)
    }

    async fn read(&self, path: &Path) -> Result<Bytes> {
        match fs::read(path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(ThumbError::NotFound(path.display().to_string()))
            }
            Err(e) => Err(ThumbError::Io(e)),
        }
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            self.ensure_directory(parent).await?;
        }

        let staging = temp_path_for(path);
        let staged = async {
            let mut file = fs::File::create(&staging).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
            fs::rename(&staging, path).await
        }
        .await;

        if let Err(e) = staged {
            let _ = fs::remove_file(&staging).await;
            return Err(ThumbError::Storage(format!(
                "failed to write {}: {}",
                path.display(),
                e
            )));
        }

        debug!(path = %path.display(), bytes = data.len(), "artifact stored");
        Ok(())
    }

    async fn ensure_directory(&self, path: &Path) -> Result<()> {
        // create_dir_all succeeds when another request created it first
        fs::create_dir_all(path).await.map_err(|e| {
            ThumbError::Storage(format!("failed to create {}: {}", path.display(), e))
        })
    }
}

/// Unique sibling path used to stage a write before renaming it into place
///
/// The original extension is kept last so that tools choosing an encoder by
/// extension still see the right one.
pub fn temp_path_for(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!(
            ".{}.{}.{}",
            stem,
            uuid::Uuid::new_v4().simple(),
            ext.to_string_lossy()
        ),
        None => format!(".{}.{}", stem, uuid::Uuid::new_v4().simple()),
    };
    path.with_file_name(name)
}

/// Rename a staged file over its final path, removing the staged file on failure
pub async fn promote(staging: &Path, path: &Path) -> Result<()> {
    if let Err(e) = fs::rename(staging, path).await {
        let _ = fs::remove_file(staging).await;
        return Err(ThumbError::Storage(format!(
            "failed to move {} into place: {}",
            path.display(),
            e
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::size_key;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_system_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSystemArtifactStore::new(temp_dir.path());
        let dataset = DatasetId::new("alice", "scan").unwrap();
        let path = store.artifact_path(&dataset, ArtifactKind::Thumbnail, &size_key(128));

        assert_eq!(path, temp_dir.path().join("alice/scan/128.jpg"));
        assert!(!store.exists(&path).await.unwrap());

        let data = b"jpeg bytes";
        store.write(&path, data).await.unwrap();
        assert!(store.exists(&path).await.unwrap());
        assert_eq!(&store.read(&path).await.unwrap()[..], data);

        // Overwrite replaces content and leaves no staging files behind
        store.write(&path, b"newer").await.unwrap();
        assert_eq!(&store.read(&path).await.unwrap()[..], b"newer");
        let entries = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSystemArtifactStore::new(temp_dir.path());
        let err = store.read(&temp_dir.path().join("nope.png")).await.unwrap_err();
        assert!(matches!(err, ThumbError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_ensure_directory_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSystemArtifactStore::new(temp_dir.path());
        let dir = temp_dir.path().join("a/b/c");

        let (a, b) = tokio::join!(store.ensure_directory(&dir), store.ensure_directory(&dir));
        a.unwrap();
        b.unwrap();
        store.ensure_directory(&dir).await.unwrap();
        assert!(dir.is_dir());
    }

    #[test]
    fn test_temp_path_keeps_extension() {
        let staged = temp_path_for(Path::new("/cache/a/b/128.jpg"));
        assert_eq!(staged.parent(), Some(Path::new("/cache/a/b")));
        assert_eq!(staged.extension().unwrap(), "jpg");
        assert_ne!(staged, temp_path_for(Path::new("/cache/a/b/128.jpg")));
    }
}
