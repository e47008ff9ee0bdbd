//! Volume layout
//!
//! Where each drive's subvolumes live on disk. A volume is built once from
//! configuration and never changes during a run.

use core_runtime::config::MaintenanceConfig;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// One independently mounted btrfs volume of the array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Volume {
    /// Drive name, as used in the SnapRAID `data` lines.
    pub name: String,
    /// Mount point of the btrfs root (`<btrfs_mount_dir>/<name>`).
    pub mount: PathBuf,
    /// Separate mount point of the frozen subvolume, if configured
    /// (`<snapraid_mount_dir>/<name>`).
    pub snapraid_mount: Option<PathBuf>,
    live: PathBuf,
    frozen: PathBuf,
}

impl Volume {
    pub fn new(
        name: impl Into<String>,
        mount: impl Into<PathBuf>,
        snapraid_mount: Option<PathBuf>,
        live_name: &str,
        frozen_subdir: &Path,
        frozen_name: &str,
    ) -> Self {
        let mount = mount.into();
        let live = mount.join(live_name);
        let frozen = mount.join(frozen_subdir).join(frozen_name);
        Self {
            name: name.into(),
            mount,
            snapraid_mount,
            live,
            frozen,
        }
    }

    /// All volumes of the array, in configured order.
    pub fn from_config(config: &MaintenanceConfig) -> Vec<Volume> {
        config
            .drives
            .iter()
            .map(|drive| {
                Volume::new(
                    drive.clone(),
                    config.btrfs_mount_dir.join(drive),
                    config.snapraid_mount_dir.as_ref().map(|dir| dir.join(drive)),
                    &config.live_subvolume,
                    &config.snapraid_subdir,
                    &config.frozen_subvolume,
                )
            })
            .collect()
    }

    pub fn live_path(&self) -> &Path {
        &self.live
    }

    pub fn frozen_path(&self) -> &Path {
        &self.frozen
    }

    /// Directory holding the frozen subvolume and its recovery snapshots.
    pub fn frozen_dir(&self) -> &Path {
        self.frozen.parent().unwrap_or(&self.mount)
    }

    /// File name of the frozen subvolume.
    pub fn frozen_name(&self) -> String {
        self.frozen
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// `<frozen path>.<suffix>`
    pub fn snapshot_path(&self, suffix: u32) -> PathBuf {
        self.frozen_dir()
            .join(format!("{}.{}", self.frozen_name(), suffix))
    }

    /// Path at which SnapRAID sees this volume's frozen data.
    pub fn parity_view(&self) -> &Path {
        self.snapraid_mount.as_deref().unwrap_or(&self.frozen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(subdir: &str, snapraid_mount: bool) -> MaintenanceConfig {
        let mut builder = MaintenanceConfig::builder()
            .btrfs_mount_dir("/mnt/roots")
            .drives(["d1", "d2"])
            .live_subvolume("data")
            .frozen_subvolume("snapraid")
            .snapraid_subdir(subdir)
            .snapraid_command("snapraid")
            .snapraid_config("/etc/snapraid.conf");
        if snapraid_mount {
            builder = builder.snapraid_mount_dir("/mnt/snapraid");
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_paths_without_subdir() {
        let volumes = Volume::from_config(&config("", false));

        assert_eq!(volumes.len(), 2);
        let d1 = &volumes[0];
        assert_eq!(d1.name, "d1");
        assert_eq!(d1.live_path(), Path::new("/mnt/roots/d1/data"));
        assert_eq!(d1.frozen_path(), Path::new("/mnt/roots/d1/snapraid"));
        assert_eq!(d1.frozen_dir(), Path::new("/mnt/roots/d1"));
        assert_eq!(d1.snapshot_path(3), PathBuf::from("/mnt/roots/d1/snapraid.3"));
        assert_eq!(d1.parity_view(), Path::new("/mnt/roots/d1/snapraid"));
        assert_eq!(d1.snapraid_mount, None);
    }

    #[test]
    fn test_paths_with_subdir_and_mount() {
        let volumes = Volume::from_config(&config("frozen", true));
        let d2 = &volumes[1];

        assert_eq!(d2.frozen_path(), Path::new("/mnt/roots/d2/frozen/snapraid"));
        assert_eq!(d2.snapshot_path(1), PathBuf::from("/mnt/roots/d2/frozen/snapraid.1"));
        assert_eq!(d2.snapraid_mount, Some(PathBuf::from("/mnt/snapraid/d2")));
        assert_eq!(d2.parity_view(), Path::new("/mnt/snapraid/d2"));
    }
}
