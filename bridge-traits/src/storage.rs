//! File System Abstractions
//!
//! Path probes and temp-file management used by the maintenance core. Every
//! mutation of a subvolume goes through an external command instead; this
//! trait only observes the tree, plus writing the short-lived parity
//! configuration the live-data actions need.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// File system access trait
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::FileSystemAccess;
///
/// async fn frozen_present(fs: &dyn FileSystemAccess, volume_root: &Path) -> Result<bool> {
///     fs.exists(&volume_root.join("snapraid")).await
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    /// Check if a file or directory exists
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// List all entries in a directory
    ///
    /// Returns full paths. Order is unspecified.
    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// Read entire file contents as UTF-8 text
    async fn read_to_string(&self, path: &Path) -> Result<String>;

    /// Write `contents` to a new uniquely named file in the system temp
    /// directory and return its path
    ///
    /// The file outlives this call; callers remove it with
    /// [`delete_file`](FileSystemAccess::delete_file).
    async fn write_temp_file(&self, prefix: &str, contents: &str) -> Result<PathBuf>;

    /// Delete a file
    async fn delete_file(&self, path: &Path) -> Result<()>;
}
