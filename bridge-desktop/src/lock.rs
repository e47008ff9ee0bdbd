//! Advisory run lock
//!
//! One maintenance run per configuration at a time. The lock is an exclusive
//! `flock(LOCK_EX | LOCK_NB)` on a lock file and is released when the guard
//! (and with it the file descriptor) is dropped, including on crash.

use bridge_traits::error::{BridgeError, Result};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Held run lock. Dropping it releases the lock.
#[derive(Debug)]
pub struct RunLock {
    _file: File,
    path: PathBuf,
}

impl RunLock {
    /// Try to take the lock at `path` without blocking.
    ///
    /// Fails with [`BridgeError::LockHeld`] if another process holds it.
    pub fn acquire(path: &Path) -> Result<RunLock> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        if try_flock_exclusive(&file)? {
            debug!(path = %path.display(), "Acquired run lock");
            Ok(RunLock {
                _file: file,
                path: path.to_path_buf(),
            })
        } else {
            Err(BridgeError::LockHeld(path.display().to_string()))
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        debug!(path = %self.path.display(), "Released run lock");
    }
}

/// Returns `Ok(false)` if another open file description holds the lock.
fn try_flock_exclusive(file: &File) -> io::Result<bool> {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        // SAFETY: the descriptor is owned by `file` and valid for the call.
        let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if result == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::WouldBlock || err.raw_os_error() == Some(libc::EWOULDBLOCK) {
            return Ok(false);
        }
        Err(err)
    }
    #[cfg(not(unix))]
    {
        let _ = file;
        Ok(true)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_while_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.lock");

        let guard = RunLock::acquire(&path).unwrap();
        assert_eq!(guard.path(), path.as_path());

        let err = RunLock::acquire(&path).unwrap_err();
        assert!(matches!(err, BridgeError::LockHeld(_)));

        drop(guard);
        assert!(RunLock::acquire(&path).is_ok());
    }

    #[test]
    fn test_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("run.lock");

        let _guard = RunLock::acquire(&path).unwrap();
        assert!(path.exists());
    }
}
