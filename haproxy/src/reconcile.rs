//! Config reconciliation
//!
//! Compares rendered config with the file on disk and, only when they differ,
//! replaces the file atomically and asks the balancer to reload.

use crate::error::IterationError;
use common::ShellRunner;
use std::fs::{self, File, Permissions};
use std::io::{self, ErrorKind, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::Builder;
use tracing::{debug, info, warn};

/// What one iteration did to the balancer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// On-disk config already matched; nothing written, no reload.
    Unchanged,
    /// New config written and the balancer reloaded.
    Applied,
    /// No routable backend; config and balancer left untouched.
    SkippedNoBackends,
    /// New config is on disk but the reload command failed.
    AppliedButReloadFailed { reason: String },
}

impl ReconcileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::Unchanged => "unchanged",
            ReconcileOutcome::Applied => "applied",
            ReconcileOutcome::SkippedNoBackends => "skipped-no-backends",
            ReconcileOutcome::AppliedButReloadFailed { .. } => "applied-but-reload-failed",
        }
    }
}

/// Replace `path` with `contents` so readers see either the old or the new
/// file, never a partial one.
///
/// A symlinked `path` is resolved first and its target is replaced, leaving
/// the link in place. The temp file lives in the target's directory (rename
/// must not cross filesystems) and is removed if anything fails before the
/// rename. Permission bits of the replaced file are preserved; new files get
/// 0644.
pub fn write_atomically(path: &Path, contents: &[u8]) -> io::Result<()> {
    let target = match fs::canonicalize(path) {
        Ok(resolved) => resolved,
        Err(e) if e.kind() == ErrorKind::NotFound => path.to_path_buf(),
        Err(e) => return Err(e),
    };
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let permissions = fs::metadata(&target)
        .map(|m| m.permissions())
        .unwrap_or_else(|_| Permissions::from_mode(0o644));

    let mut tmp = Builder::new()
        .prefix(".stolon-haproxy-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().set_permissions(permissions)?;
    tmp.as_file().sync_all()?;
    tmp.persist(&target).map_err(|e| e.error)?;

    // Make the rename itself durable
    if let Ok(dir) = File::open(dir) {
        if let Err(e) = dir.sync_all() {
            debug!(error = %e, "Failed to sync config directory");
        }
    }

    Ok(())
}

/// Owns the balancer config file and its reload command.
#[derive(Debug, Clone)]
pub struct ConfigReconciler {
    config_path: PathBuf,
    reload_command: String,
    timeout: Duration,
}

impl ConfigReconciler {
    pub fn new(
        config_path: impl Into<PathBuf>,
        reload_command: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            config_path: config_path.into(),
            reload_command: reload_command.into(),
            timeout,
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Current on-disk config. An unreadable file counts as "different".
    fn current_config(&self) -> Option<Vec<u8>> {
        match fs::read(&self.config_path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %self.config_path.display(), "Config file does not exist yet");
                None
            }
            Err(e) => {
                warn!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Cannot read current config, rewriting it"
                );
                None
            }
        }
    }

    /// Apply `rendered` if it differs from the file on disk.
    ///
    /// A failed reload is reported through the outcome and not retried; the
    /// next iteration sees the file up to date and does nothing.
    pub async fn reconcile<R: ShellRunner>(
        &self,
        rendered: &str,
        runner: &R,
    ) -> Result<ReconcileOutcome, IterationError> {
        if self.current_config().as_deref() == Some(rendered.as_bytes()) {
            return Ok(ReconcileOutcome::Unchanged);
        }

        write_atomically(&self.config_path, rendered.as_bytes()).map_err(|source| {
            IterationError::Write {
                path: self.config_path.clone(),
                source,
            }
        })?;
        info!(path = %self.config_path.display(), "Config changed, reloading HAProxy");

        let outcome = match runner.run_shell(&self.reload_command, self.timeout).await {
            Ok(output) if output.success => ReconcileOutcome::Applied,
            Ok(output) => ReconcileOutcome::AppliedButReloadFailed {
                reason: format!(
                    "{} ({}): {}",
                    self.reload_command,
                    output.exit_description(),
                    output.stderr
                ),
            },
            Err(e) => ReconcileOutcome::AppliedButReloadFailed {
                reason: e.to_string(),
            },
        };

        Ok(outcome)
    }
}
