//! Diagnostic tracing for the `durable` binary.
//!
//! The library only emits `tracing` events; installing a subscriber is left to
//! the binary (or to embedders).

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DEFAULT_FILTER: &str = "warn";

/// Picks the filter directive: `RUST_LOG`, then the configured filter, then `warn`.
pub fn build_filter(configured: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        configured
            .and_then(|directive| EnvFilter::try_new(directive).ok())
            .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
    })
}

/// Installs a compact stderr subscriber.
///
/// ```bash
/// RUST_LOG=durable_agent=debug durable replay <task-id> --workflow workflow.yaml
/// ```
pub fn init(configured: Option<&str>) {
    // A subscriber installed earlier (e.g. by an embedding app) stays in charge.
    let _ = tracing_subscriber::registry()
        .with(build_filter(configured))
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
