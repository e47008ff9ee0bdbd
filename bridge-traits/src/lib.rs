//! # Host Bridge Traits
//!
//! Host abstraction traits that the maintenance core depends on.
//!
//! ## Overview
//!
//! This crate defines the contract between the maintenance core and the
//! concrete host implementations. Each trait represents a capability the core
//! requires but which must be supplied from outside: running external
//! programs, probing the filesystem, and reading the clock. Keeping these
//! behind traits is what allows the orchestration logic to be exercised
//! against an in-memory fake host in tests.
//!
//! ## Traits
//!
//! ### Process Execution
//! - [`CommandRunner`](process::CommandRunner) - Run an external program and capture its output
//!
//! ### Storage
//! - [`FileSystemAccess`](storage::FileSystemAccess) - Path probes, directory listings, temp files
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Implementations
//!
//! | Host     | Implementation Crate | Notes |
//! |----------|---------------------|-------|
//! | Linux    | `bridge-desktop`    | tokio process + tokio fs |
//! | Tests    | in-crate fakes      | simulated subvolume tree |
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. A
//! failing external command is reported as
//! [`BridgeError::CommandFailed`](error::BridgeError::CommandFailed), carrying
//! the rendered command line, the exit status (if the process ran at all) and
//! its captured stderr.
//!
//! ## Example
//!
//! ```ignore
//! use bridge_traits::process::{CommandRunner, CommandSpec};
//!
//! async fn list_subvolumes(runner: &dyn CommandRunner) -> bridge_traits::error::Result<String> {
//!     let spec = CommandSpec::new("btrfs")
//!         .args(["subvolume", "list", "/mnt/disk1"])
//!         .read_only();
//!     Ok(runner.run(&spec).await?.stdout)
//! }
//! ```

pub mod error;
pub mod process;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use process::{CommandOutput, CommandRunner, CommandSpec};
pub use storage::FileSystemAccess;
pub use time::{Clock, LogLevel, SystemClock};
