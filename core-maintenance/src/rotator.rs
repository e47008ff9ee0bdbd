//! # Snapshot Rotator
//!
//! Keeps a rolling set of read-only recovery snapshots of each frozen
//! subvolume. Snapshots live next to frozen as `<frozen>.<n>`; suffix 1 is
//! the newest. Ordering comes only from the suffix, never from timestamps.
//!
//! Taking a snapshot shifts every existing one up by one (`n → n+1`, highest
//! first, by rename) and then creates the new one at suffix 1.

use crate::subvolume::{btrfs, path_arg};
use crate::volume::Volume;
use crate::Result;
use bridge_traits::{CommandRunner, CommandSpec, FileSystemAccess};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// A recovery snapshot found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoverySnapshot {
    pub volume: String,
    /// Position in the set, 0 being the most recent.
    pub index: usize,
    /// On-disk suffix.
    pub suffix: u32,
    pub path: PathBuf,
}

pub struct SnapshotRotator {
    runner: Arc<dyn CommandRunner>,
    fs: Arc<dyn FileSystemAccess>,
}

impl SnapshotRotator {
    pub fn new(runner: Arc<dyn CommandRunner>, fs: Arc<dyn FileSystemAccess>) -> Self {
        Self { runner, fs }
    }

    /// Snapshots currently on disk, newest first. Gaps in the suffixes are
    /// tolerated.
    pub async fn list(&self, volume: &Volume) -> Result<Vec<RecoverySnapshot>> {
        let dir = volume.frozen_dir();
        if !self.fs.exists(dir).await? {
            return Ok(Vec::new());
        }

        let prefix = format!("{}.", volume.frozen_name());
        let mut suffixes: Vec<u32> = self
            .fs
            .list_directory(dir)
            .await?
            .iter()
            .filter_map(|entry| entry.file_name()?.to_str().map(str::to_owned))
            .filter_map(|name| {
                let digits = name.strip_prefix(&prefix)?;
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                digits.parse::<u32>().ok().filter(|n| *n > 0)
            })
            .collect();
        suffixes.sort_unstable();
        suffixes.dedup();

        Ok(suffixes
            .into_iter()
            .enumerate()
            .map(|(index, suffix)| RecoverySnapshot {
                volume: volume.name.clone(),
                index,
                suffix,
                path: volume.snapshot_path(suffix),
            })
            .collect())
    }

    /// Takes a new read-only snapshot of frozen at index 0.
    #[instrument(skip(self, volume), fields(volume = %volume.name))]
    pub async fn snapshot_frozen(&self, volume: &Volume) -> Result<RecoverySnapshot> {
        let existing = self.list(volume).await?;

        for snapshot in existing.iter().rev() {
            let target = volume.snapshot_path(snapshot.suffix + 1);
            self.runner
                .run(
                    &CommandSpec::new("mv")
                        .arg("-v")
                        .arg(path_arg(&snapshot.path))
                        .arg(path_arg(&target)),
                )
                .await?;
        }

        let path = volume.snapshot_path(1);
        self.runner
            .run(
                &btrfs(["subvolume", "snapshot", "-r"])
                    .arg(path_arg(volume.frozen_path()))
                    .arg(path_arg(&path)),
            )
            .await?;

        info!("Created recovery snapshot {}", path.display());
        Ok(RecoverySnapshot {
            volume: volume.name.clone(),
            index: 0,
            suffix: 1,
            path,
        })
    }

    /// Deletes snapshots beyond the first `keep`, oldest first.
    ///
    /// `keep` below 1 is treated as 1. Stops at the first failed delete.
    /// Returns the snapshots that were deleted.
    #[instrument(skip(self, volume), fields(volume = %volume.name))]
    pub async fn prune(&self, volume: &Volume, keep: usize) -> Result<Vec<RecoverySnapshot>> {
        let keep = keep.max(1);
        let snapshots = self.list(volume).await?;
        let mut deleted = Vec::new();

        for snapshot in snapshots.into_iter().skip(keep).rev() {
            self.runner
                .run(&btrfs(["subvolume", "delete"]).arg(path_arg(&snapshot.path)))
                .await?;
            debug!("Deleted recovery snapshot {}", snapshot.path.display());
            deleted.push(snapshot);
        }

        if !deleted.is_empty() {
            info!(count = deleted.len(), keep, "Pruned old recovery snapshots");
        }
        Ok(deleted)
    }
}
