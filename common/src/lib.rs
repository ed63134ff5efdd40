//! Shared utilities for the stolon-haproxy components
//!
//! This crate provides common functionality used by the entrypoints:
//! - Structured logging initialization
//! - Environment variable parsing helpers
//! - Command execution with timeouts

pub mod command;
pub mod config;
pub mod logging;

pub use command::{run_shell, CommandError, CommandOutput, ShellRunner, SystemShell};
pub use config::ConfigExt;
pub use logging::init_logging;
