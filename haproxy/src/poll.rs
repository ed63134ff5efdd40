//! Poll loop
//!
//! Runs one reconciliation per interval. Every recoverable failure is logged
//! at the iteration boundary and the loop carries on with the next poll.

use crate::backends::{resolve, BackendSet};
use crate::config::Settings;
use crate::error::{IterationError, StartupError};
use crate::reconcile::{ConfigReconciler, ReconcileOutcome};
use crate::snapshot::SnapshotReader;
use crate::template::ConfigRenderer;
use crate::topology::classify;
use common::ShellRunner;
use std::future::Future;
use std::io;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Drives snapshot -> classification -> resolution -> rendering -> reconciliation.
pub struct PollLoop<R> {
    reader: SnapshotReader,
    reconciler: ConfigReconciler,
    renderer: ConfigRenderer,
    fallback_to_master: bool,
    interval: Duration,
    runner: R,
    /// Backend set behind the config currently on disk
    current: Mutex<BackendSet>,
}

impl<R: ShellRunner> PollLoop<R> {
    pub fn new(settings: &Settings, runner: R) -> Result<Self, StartupError> {
        Ok(Self {
            reader: SnapshotReader::new(
                settings.stolonctl_command.as_str(),
                settings.command_timeout(),
            ),
            reconciler: ConfigReconciler::new(
                settings.postgres_haproxy_config.as_path(),
                settings.haproxy_reload_command.as_str(),
                settings.command_timeout(),
            ),
            renderer: ConfigRenderer::new(settings.template_source(), settings.tunables()?),
            fallback_to_master: settings.fallback_to_master,
            interval: settings.poll_interval(),
            runner,
            current: Mutex::new(BackendSet::default()),
        })
    }

    /// Run a single iteration.
    pub async fn run_once(&self) -> Result<ReconcileOutcome, IterationError> {
        let snapshot = self.reader.read(&self.runner).await?;
        let backends = resolve(classify(&snapshot), self.fallback_to_master);

        if backends.is_empty() {
            return Ok(ReconcileOutcome::SkippedNoBackends);
        }
        if backends.used_fallback {
            warn!(
                primary = ?backends.primary.as_ref().map(ToString::to_string),
                "No healthy standbys, routing read traffic to the primary"
            );
        }

        let rendered = self.renderer.render(&backends)?;
        let outcome = self.reconciler.reconcile(&rendered, &self.runner).await?;

        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if outcome != ReconcileOutcome::Unchanged {
            let changes = backends.changes_since(&current);
            info!(
                added = ?changes.added,
                removed = ?changes.removed,
                primary = ?backends.primary.as_ref().map(ToString::to_string),
                fallback = backends.used_fallback,
                "Backend set changed"
            );
        }
        *current = backends;
        Ok(outcome)
    }

    /// Poll until `shutdown` completes. Shutdown is only observed between
    /// iterations, so an iteration in progress always finishes.
    pub async fn run_until<F: Future<Output = ()>>(&self, shutdown: F) {
        tokio::pin!(shutdown);

        info!(
            interval_ms = self.interval.as_millis() as u64,
            config = %self.reconciler.config_path().display(),
            fallback_to_master = self.fallback_to_master,
            "Polling cluster data"
        );

        loop {
            report(&self.run_once().await);

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Poll loop stopped");
                    return;
                }
                _ = sleep(self.interval) => {}
            }
        }
    }

    /// Poll until SIGTERM or SIGINT.
    pub async fn run(&self) -> io::Result<()> {
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        let shutdown = async move {
            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM"),
                _ = sigint.recv() => info!("Received SIGINT"),
            }
        };

        self.run_until(shutdown).await;
        Ok(())
    }
}

/// Log an iteration result at the severity it deserves.
fn report(result: &Result<ReconcileOutcome, IterationError>) {
    match result {
        Ok(outcome @ ReconcileOutcome::Unchanged) => {
            info!(outcome = outcome.as_str(), "Config not changed");
        }
        Ok(outcome @ ReconcileOutcome::Applied) => {
            info!(outcome = outcome.as_str(), "Config applied and HAProxy reloaded");
        }
        Ok(outcome @ ReconcileOutcome::SkippedNoBackends) => {
            error!(
                outcome = outcome.as_str(),
                "No available backends, keeping current HAProxy config"
            );
        }
        Ok(outcome @ ReconcileOutcome::AppliedButReloadFailed { reason }) => {
            error!(
                outcome = outcome.as_str(),
                reason = %reason,
                "Config written but HAProxy reload failed, reload it manually"
            );
        }
        Err(e) if e.is_alarming() => {
            error!(
                error = %e,
                "Failed to write HAProxy config, balancer keeps the previous one"
            );
        }
        Err(e) => {
            error!(error = %e, "Poll iteration failed");
        }
    }
}
