//! File System Access Implementation using Tokio

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::FileSystemAccess,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Tokio-based file system implementation
///
/// Temp files are created in `temp_dir` (the system temp directory unless
/// overridden) through `tempfile`, then persisted so they survive until
/// explicitly deleted.
pub struct TokioFileSystem {
    temp_dir: PathBuf,
}

impl TokioFileSystem {
    /// Create a new file system accessor using the system temp directory
    pub fn new() -> Self {
        Self {
            temp_dir: std::env::temp_dir(),
        }
    }

    /// Create a new file system accessor with a custom temp directory
    pub fn with_temp_dir(temp_dir: PathBuf) -> Self {
        Self { temp_dir }
    }

    /// Convert std::io::Error to BridgeError
    fn map_io_error(e: std::io::Error) -> BridgeError {
        BridgeError::Io(e)
    }
}

impl Default for TokioFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileSystemAccess for TokioFileSystem {
    async fn exists(&self, path: &Path) -> Result<bool> {
        fs::try_exists(path).await.map_err(Self::map_io_error)
    }

    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        let mut read_dir = fs::read_dir(path).await.map_err(Self::map_io_error)?;

        while let Some(entry) = read_dir.next_entry().await.map_err(Self::map_io_error)? {
            entries.push(entry.path());
        }

        debug!(path = ?path, count = entries.len(), "Listed directory");
        Ok(entries)
    }

    async fn read_to_string(&self, path: &Path) -> Result<String> {
        let text = fs::read_to_string(path).await.map_err(Self::map_io_error)?;
        debug!(path = ?path, size = text.len(), "Read file");
        Ok(text)
    }

    async fn write_temp_file(&self, prefix: &str, contents: &str) -> Result<PathBuf> {
        let temp_dir = self.temp_dir.clone();
        let prefix = prefix.to_string();
        let contents = contents.to_string();

        // tempfile is synchronous; keep it off the async workers.
        let path = tokio::task::spawn_blocking(move || -> std::io::Result<PathBuf> {
            let mut file = tempfile::Builder::new()
                .prefix(&prefix)
                .suffix(".conf")
                .tempfile_in(&temp_dir)?;
            file.write_all(contents.as_bytes())?;
            file.flush()?;
            let (_, path) = file.keep().map_err(|e| e.error)?;
            Ok(path)
        })
        .await
        .map_err(|e| BridgeError::OperationFailed(format!("Temp file task failed: {}", e)))?
        .map_err(Self::map_io_error)?;

        debug!(path = ?path, "Wrote temp file");
        Ok(path)
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).await.map_err(Self::map_io_error)?;
        debug!(path = ?path, "Deleted file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_read_delete_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let fs = TokioFileSystem::with_temp_dir(dir.path().to_path_buf());

        let path = fs.write_temp_file("snapraid-live-", "data d1 /mnt/d1/data\n").await.unwrap();
        assert!(path.starts_with(dir.path()));
        assert!(fs.exists(&path).await.unwrap());
        assert_eq!(fs.read_to_string(&path).await.unwrap(), "data d1 /mnt/d1/data\n");

        fs.delete_file(&path).await.unwrap();
        assert!(!fs.exists(&path).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("snapraid.1")).unwrap();
        std::fs::create_dir(dir.path().join("snapraid.2")).unwrap();

        let fs = TokioFileSystem::new();
        let mut entries = fs.list_directory(dir.path()).await.unwrap();
        entries.sort();

        assert_eq!(
            entries,
            vec![dir.path().join("snapraid.1"), dir.path().join("snapraid.2")]
        );
    }

    #[tokio::test]
    async fn test_missing_directory_is_io_error() {
        let fs = TokioFileSystem::new();
        let err = fs
            .list_directory(Path::new("/nonexistent/btrfs-snapraid-test"))
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::Io(_)));
    }
}
