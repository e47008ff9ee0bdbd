//! # Subvolume Manager
//!
//! Replaces each volume's frozen subvolume with a fresh writable clone of the
//! live one. The replacement is delete-then-create and therefore not atomic:
//! a failure between the two leaves the volume without a frozen subvolume,
//! which is detected by probing the path and reported as
//! [`MaintenanceError::FrozenMissing`].

use crate::parity::ParityTool;
use crate::volume::Volume;
use crate::{MaintenanceError, Result};
use bridge_traits::{CommandRunner, CommandSpec, FileSystemAccess};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub struct SubvolumeManager {
    runner: Arc<dyn CommandRunner>,
    fs: Arc<dyn FileSystemAccess>,
}

impl SubvolumeManager {
    pub fn new(runner: Arc<dyn CommandRunner>, fs: Arc<dyn FileSystemAccess>) -> Self {
        Self { runner, fs }
    }

    /// Deletes the frozen subvolume and re-creates it from live.
    ///
    /// When the volume has a secondary mount it is unmounted first and
    /// mounted again afterwards.
    ///
    /// # Errors
    ///
    /// - [`MaintenanceError::SubvolumeNotFound`] if live is missing; nothing is
    ///   touched in that case.
    /// - [`MaintenanceError::FrozenMissing`] if the clone failed after the old
    ///   frozen subvolume was deleted.
    /// - [`MaintenanceError::ExternalCommand`] for any other command failure.
    #[instrument(skip(self, volume), fields(volume = %volume.name))]
    pub async fn refresh_frozen(&self, volume: &Volume) -> Result<()> {
        let live = volume.live_path();
        let frozen = volume.frozen_path();

        if !self.fs.exists(live).await? {
            return Err(MaintenanceError::SubvolumeNotFound {
                volume: volume.name.clone(),
                path: live.to_path_buf(),
            });
        }

        info!("Refreshing frozen subvolume {} from {}", frozen.display(), live.display());

        if let Some(mount) = &volume.snapraid_mount {
            self.unmount(mount).await?;
        }

        if self.fs.exists(frozen).await? {
            self.runner
                .run(&btrfs(["subvolume", "delete"]).arg(path_arg(frozen)))
                .await?;
        } else {
            warn!(
                "Frozen subvolume {} is missing, probably left over from an interrupted run; recreating it",
                frozen.display()
            );
        }

        let create = btrfs(["subvolume", "snapshot"])
            .arg(path_arg(live))
            .arg(path_arg(frozen));
        if let Err(err) = self.runner.run(&create).await {
            let err = MaintenanceError::from(err);
            if !self.fs.exists(frozen).await.unwrap_or(false) {
                return Err(MaintenanceError::FrozenMissing {
                    volume: volume.name.clone(),
                    path: frozen.to_path_buf(),
                    cause: err.to_string(),
                });
            }
            return Err(err);
        }

        if let Some(mount) = &volume.snapraid_mount {
            self.runner
                .run(&CommandSpec::new("mount").arg(path_arg(mount)))
                .await?;
        }

        debug!("Frozen subvolume refreshed");
        Ok(())
    }

    /// Updates sub-second timestamps on the live data of every volume.
    ///
    /// All live subvolumes are checked before anything runs; one missing
    /// subvolume fails the whole operation.
    #[instrument(skip(self, volumes, parity))]
    pub async fn touch_live(&self, volumes: &[Volume], parity: &ParityTool) -> Result<()> {
        for volume in volumes {
            if !self.fs.exists(volume.live_path()).await? {
                return Err(MaintenanceError::SubvolumeNotFound {
                    volume: volume.name.clone(),
                    path: volume.live_path().to_path_buf(),
                });
            }
        }

        parity.touch_live(volumes).await
    }

    // A failed unmount is not fatal: after a crash the mount point may
    // already be unmounted.
    async fn unmount(&self, mount: &Path) -> Result<()> {
        let output = self
            .runner
            .run(&CommandSpec::new("umount").arg(path_arg(mount)).allow_failure())
            .await?;
        if output.exit_status != Some(0) {
            warn!(
                "umount {} exited with {:?}: {}",
                mount.display(),
                output.exit_status,
                output.stderr.trim()
            );
        }
        Ok(())
    }
}

pub(crate) fn btrfs<const N: usize>(args: [&str; N]) -> CommandSpec {
    CommandSpec::new("btrfs").args(args)
}

pub(crate) fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
