//! Stolon to HAProxy backend reconciler
//!
//! Polls stolon cluster data, works out which PostgreSQL instances should
//! receive read traffic, and rewrites the HAProxy config (reloading HAProxy)
//! only when that set changes.
//!
//! Pipeline per iteration:
//! `snapshot` -> `topology` -> `backends` -> `template` -> `reconcile`,
//! driven by `poll`.

pub mod backends;
pub mod config;
pub mod error;
pub mod poll;
pub mod reconcile;
pub mod snapshot;
pub mod template;
pub mod topology;

#[cfg(test)]
mod testing;

pub use backends::{resolve, BackendChanges, BackendSet};
pub use config::{Settings, StolonEnv};
pub use error::{DataSourceError, IterationError, StartupError};
pub use poll::PollLoop;
pub use reconcile::{write_atomically, ConfigReconciler, ReconcileOutcome};
pub use snapshot::{ClusterSnapshot, InstanceRecord, Role, SnapshotReader};
pub use template::{render, ConfigRenderer, TemplateSource, Tunables, BUILTIN_TEMPLATE};
pub use topology::{classify, Classification, Endpoint};
