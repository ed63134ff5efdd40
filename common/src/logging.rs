//! Structured logging initialization
//!
//! Provides consistent logging initialization across components.
//! `RUST_LOG` controls verbosity, `LOG_FORMAT=json` switches to JSON lines.

use crate::config::ConfigExt;
use tracing::debug;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Guard that keeps the tracing subscriber active.
/// Drop this at the end of main to flush logs.
pub struct LogGuard;

/// Initialize structured logging for a component.
///
/// Returns a guard that should be held for the lifetime of the program.
///
/// # Example
/// ```ignore
/// let _guard = init_logging("stolon-haproxy");
/// info!("Starting up...");
/// ```
pub fn init_logging(component: &str) -> LogGuard {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    let json = String::env_or("LOG_FORMAT", "text").eq_ignore_ascii_case("json");

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_target(false))
            .init();
    } else {
        registry.with(fmt::layer().with_target(false)).init();
    }

    debug!(component, json, "Logging initialized");
    LogGuard
}
