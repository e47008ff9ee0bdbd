//! # Desktop Bridge Implementations
//!
//! Default implementations of the bridge traits for a Linux host.
//!
//! ## Overview
//!
//! - `CommandRunner` using `tokio::process` ([`TokioCommandRunner`])
//! - `CommandRunner` that only logs mutations ([`DryRunCommandRunner`])
//! - `FileSystemAccess` using `tokio::fs` and `tempfile` ([`TokioFileSystem`])
//! - Advisory run lock using `flock` ([`RunLock`])
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{DryRunCommandRunner, TokioCommandRunner, TokioFileSystem};
//! use std::sync::Arc;
//!
//! let real = Arc::new(TokioCommandRunner::new());
//! let runner: Arc<dyn bridge_traits::CommandRunner> = if dry_run {
//!     Arc::new(DryRunCommandRunner::new(real))
//! } else {
//!     real
//! };
//! let fs = Arc::new(TokioFileSystem::new());
//! ```

mod dry_run;
mod filesystem;
mod lock;
mod process;

pub use dry_run::DryRunCommandRunner;
pub use filesystem::TokioFileSystem;
pub use lock::RunLock;
pub use process::TokioCommandRunner;
