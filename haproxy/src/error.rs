//! Error types
//!
//! Startup errors are fatal. Iteration errors are the closed set of
//! conditions the poll loop logs and survives.

use common::CommandError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors raised while the process is starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to load config file {}: {reason}", .path.display())]
    ConfigLoad { path: PathBuf, reason: String },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("Please set {0} environment variable")]
    MissingEnvironment(&'static str),
}

/// Recoverable errors that abandon a single poll iteration.
#[derive(Debug, Error)]
pub enum IterationError {
    #[error("cluster data source failed: {0}")]
    DataSource(#[from] DataSourceError),

    #[error("failed to parse cluster data: {0}")]
    Parse(String),

    #[error("failed to render balancer config: {0}")]
    Render(String),

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Why the data source command produced no usable output.
#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("`{command}` failed ({exit}): {stderr}")]
    Failed {
        command: String,
        exit: String,
        stderr: String,
    },
}

impl From<serde_json::Error> for IterationError {
    fn from(e: serde_json::Error) -> Self {
        IterationError::Parse(e.to_string())
    }
}

impl From<minijinja::Error> for IterationError {
    fn from(e: minijinja::Error) -> Self {
        IterationError::Render(e.to_string())
    }
}

impl IterationError {
    /// Write failures leave the balancer on stale config and deserve louder reporting.
    pub fn is_alarming(&self) -> bool {
        matches!(self, IterationError::Write { .. })
    }
}
