//! Tracing initialization.
//!
//! Sets up tracing-subscriber with a console fmt layer and an env-filter.
//! The filter defaults to `info` and can be overridden with `RUST_LOG`,
//! e.g. `RUST_LOG=shopctl=debug,tower_http=debug`.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize the global tracing subscriber.
///
/// Safe to call once per process; subsequent calls fail silently so tests
/// that each initialize telemetry do not panic.
pub fn init_telemetry() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
