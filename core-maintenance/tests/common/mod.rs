//! In-memory host for maintenance flow tests.
//!
//! One simulated machine backs both the `CommandRunner` and the
//! `FileSystemAccess` side, so the orchestrator observes the effects of its
//! own commands. Subvolumes carry a generation number: a clone copies the
//! generation of its source, which lets tests tell which data ended up where.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::{CommandOutput, CommandRunner, CommandSpec, FileSystemAccess};
use core_runtime::config::{MaintenanceConfig, MaintenanceConfigBuilder};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const ROOT: &str = "/mnt/roots";
pub const SNAPRAID_CONF: &str = "/etc/snapraid.conf";
pub const SNAPRAID_CMD: &str = "snapraid";

#[derive(Default)]
struct HostState {
    /// Subvolume path → generation of the data it holds.
    subvolumes: BTreeMap<PathBuf, u64>,
    read_only: BTreeSet<PathBuf>,
    files: HashMap<PathBuf, String>,
    commands: Vec<String>,
    /// Commands whose text contains one of these fragments fail with exit 1.
    failures: Vec<String>,
    diff_stdout: String,
    diff_exit: i32,
    /// Contents of the `--conf` file, per SnapRAID subcommand, at call time.
    conf_seen: HashMap<String, String>,
    temp_counter: u32,
}

#[derive(Clone)]
pub struct FakeHost {
    state: Arc<Mutex<HostState>>,
}

impl FakeHost {
    /// A host with live and frozen subvolumes on every drive and a SnapRAID
    /// configuration pointing at the frozen ones.
    pub fn new(drives: &[&str]) -> Self {
        let mut state = HostState {
            diff_stdout: summary(0, 0),
            ..Default::default()
        };

        let mut conf = String::from("# test array\nparity /mnt/parity/snapraid.parity\ncontent /var/snapraid/content\n\n");
        for drive in drives {
            state.subvolumes.insert(live(drive), 1);
            state.subvolumes.insert(frozen(drive), 0);
            conf.push_str(&format!("data {drive} {}/\n", frozen(drive).display()));
        }
        state.files.insert(PathBuf::from(SNAPRAID_CONF), conf);

        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn fail_on(&self, fragment: &str) {
        self.state.lock().unwrap().failures.push(fragment.to_string());
    }

    pub fn clear_failures(&self) {
        self.state.lock().unwrap().failures.clear();
    }

    pub fn set_diff(&self, exit: i32, stdout: &str) {
        let mut state = self.state.lock().unwrap();
        state.diff_exit = exit;
        state.diff_stdout = stdout.to_string();
    }

    /// Simulates users writing to the live data.
    pub fn bump_live(&self, drive: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(generation) = state.subvolumes.get_mut(&live(drive)) {
            *generation += 1;
        }
    }

    pub fn remove_subvolume(&self, path: &Path) {
        self.state.lock().unwrap().subvolumes.remove(path);
    }

    pub fn generation(&self, path: &Path) -> Option<u64> {
        self.state.lock().unwrap().subvolumes.get(path).copied()
    }

    pub fn is_read_only(&self, path: &Path) -> bool {
        self.state.lock().unwrap().read_only.contains(path)
    }

    pub fn subvolume_paths(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().subvolumes.keys().cloned().collect()
    }

    /// Recovery snapshots of a drive, ordered by suffix.
    pub fn snapshots(&self, drive: &str) -> Vec<PathBuf> {
        let prefix = format!("{}.", frozen(drive).display());
        let mut found: Vec<(u32, PathBuf)> = self
            .state
            .lock()
            .unwrap()
            .subvolumes
            .keys()
            .filter_map(|p| {
                let suffix = p.to_str()?.strip_prefix(&prefix)?.parse().ok()?;
                Some((suffix, p.clone()))
            })
            .collect();
        found.sort();
        found.into_iter().map(|(_, p)| p).collect()
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn ran(&self, fragment: &str) -> bool {
        self.commands().iter().any(|c| c.contains(fragment))
    }

    pub fn snapraid_ran(&self, subcommand: &str) -> bool {
        self.commands()
            .iter()
            .any(|c| c.starts_with(SNAPRAID_CMD) && c.ends_with(&format!(" {subcommand}")))
    }

    pub fn conf_seen_by(&self, subcommand: &str) -> Option<String> {
        self.state.lock().unwrap().conf_seen.get(subcommand).cloned()
    }

    pub fn temp_files(&self) -> Vec<PathBuf> {
        self.state
            .lock()
            .unwrap()
            .files
            .keys()
            .filter(|p| p.starts_with("/tmp"))
            .cloned()
            .collect()
    }
}

pub fn live(drive: &str) -> PathBuf {
    Path::new(ROOT).join(drive).join("data")
}

pub fn frozen(drive: &str) -> PathBuf {
    Path::new(ROOT).join(drive).join("snapraid")
}

pub fn summary(removed: u64, updated: u64) -> String {
    format!(
        "   100 equal\n     1 added\n{removed:>6} removed\n{updated:>6} updated\n     0 moved\n     0 copied\n     0 restored\n"
    )
}

/// Builder for a configuration matching [`FakeHost::new`].
pub fn config_builder(drives: &[&str]) -> MaintenanceConfigBuilder {
    MaintenanceConfig::builder()
        .btrfs_mount_dir(ROOT)
        .drives(drives.iter().copied())
        .live_subvolume("data")
        .frozen_subvolume("snapraid")
        .snapraid_command(SNAPRAID_CMD)
        .snapraid_config(SNAPRAID_CONF)
        .touch(false)
}

pub fn config(drives: &[&str]) -> Arc<MaintenanceConfig> {
    Arc::new(config_builder(drives).build().unwrap())
}

fn not_found(path: &Path) -> BridgeError {
    BridgeError::Io(io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} not found", path.display()),
    ))
}

impl HostState {
    fn exists(&self, path: &Path) -> bool {
        self.subvolumes.contains_key(path)
            || self.files.contains_key(path)
            || self
                .subvolumes
                .keys()
                .chain(self.files.keys())
                .any(|p| p != path && p.starts_with(path))
    }

    fn execute(&mut self, spec: &CommandSpec) -> (i32, String, String) {
        let args: Vec<&str> = spec.args.iter().map(String::as_str).collect();
        match (spec.program.as_str(), args.as_slice()) {
            ("btrfs", ["subvolume", "delete", path]) => {
                let path = PathBuf::from(path);
                if self.subvolumes.remove(&path).is_some() {
                    self.read_only.remove(&path);
                    (0, format!("Delete subvolume '{}'\n", path.display()), String::new())
                } else {
                    (1, String::new(), "ERROR: Not a Btrfs subvolume\n".to_string())
                }
            }
            ("btrfs", ["subvolume", "snapshot", rest @ ..]) => {
                let (read_only, src, dst) = match rest {
                    ["-r", src, dst] => (true, *src, *dst),
                    [src, dst] => (false, *src, *dst),
                    _ => return (1, String::new(), "usage\n".to_string()),
                };
                let (src, dst) = (PathBuf::from(src), PathBuf::from(dst));
                let Some(generation) = self.subvolumes.get(&src).copied() else {
                    return (1, String::new(), "ERROR: Not a Btrfs subvolume\n".to_string());
                };
                if self.subvolumes.contains_key(&dst) {
                    return (1, String::new(), "ERROR: target path already exists\n".to_string());
                }
                self.subvolumes.insert(dst.clone(), generation);
                if read_only {
                    self.read_only.insert(dst);
                }
                (0, String::new(), String::new())
            }
            ("mv", ["-v", src, dst]) => {
                let (src, dst) = (PathBuf::from(src), PathBuf::from(dst));
                if self.subvolumes.contains_key(&dst) {
                    return (1, String::new(), "mv: target exists\n".to_string());
                }
                let Some(generation) = self.subvolumes.remove(&src) else {
                    return (1, String::new(), "mv: cannot stat\n".to_string());
                };
                self.subvolumes.insert(dst.clone(), generation);
                if self.read_only.remove(&src) {
                    self.read_only.insert(dst.clone());
                }
                (0, format!("renamed '{}' -> '{}'\n", src.display(), dst.display()), String::new())
            }
            ("mount", [_]) | ("umount", [_]) => (0, String::new(), String::new()),
            (SNAPRAID_CMD, ["--conf", conf, "--quiet", .., subcommand]) => {
                let contents = self
                    .files
                    .get(Path::new(conf))
                    .cloned()
                    .unwrap_or_default();
                self.conf_seen.insert(subcommand.to_string(), contents);
                match *subcommand {
                    "diff" => (self.diff_exit, self.diff_stdout.clone(), String::new()),
                    "sync" | "touch" | "scrub" => (0, String::new(), String::new()),
                    other => (1, String::new(), format!("Unknown command '{other}'\n")),
                }
            }
            _ => (127, String::new(), format!("{}: command not found\n", spec.program)),
        }
    }
}

#[async_trait]
impl CommandRunner for FakeHost {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let mut state = self.state.lock().unwrap();
        let line = spec.to_string();
        state.commands.push(line.clone());

        let (exit, stdout, stderr) = if state.failures.iter().any(|f| line.contains(f.as_str())) {
            (1, String::new(), "injected failure\n".to_string())
        } else {
            state.execute(spec)
        };

        CommandOutput::new(Some(exit), stdout, stderr).check(spec)
    }
}

#[async_trait]
impl FileSystemAccess for FakeHost {
    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(self.state.lock().unwrap().exists(path))
    }

    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let state = self.state.lock().unwrap();
        if !state.exists(path) {
            return Err(not_found(path));
        }

        let children: BTreeSet<PathBuf> = state
            .subvolumes
            .keys()
            .chain(state.files.keys())
            .filter_map(|p| {
                let rest = p.strip_prefix(path).ok()?;
                let first = rest.components().next()?;
                Some(path.join(first))
            })
            .collect();
        Ok(children.into_iter().collect())
    }

    async fn read_to_string(&self, path: &Path) -> Result<String> {
        self.state
            .lock()
            .unwrap()
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| not_found(path))
    }

    async fn write_temp_file(&self, prefix: &str, contents: &str) -> Result<PathBuf> {
        let mut state = self.state.lock().unwrap();
        state.temp_counter += 1;
        let path = PathBuf::from(format!("/tmp/{}{}.conf", prefix, state.temp_counter));
        state.files.insert(path.clone(), contents.to_string());
        Ok(path)
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| not_found(path))
    }
}
