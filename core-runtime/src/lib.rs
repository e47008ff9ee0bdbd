//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the maintenance tool:
//! - Configuration model and TOML loading
//! - Logging and tracing infrastructure
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the maintenance core and
//! the CLI depend on. It establishes the configuration contract (a single
//! immutable [`config::MaintenanceConfig`] validated before anything touches
//! the disks), the logging conventions, and the event broadcasting mechanism
//! used to observe a run.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
