//! Logging setup (§10.3). Initialized once in `main`; every other module just uses the
//! `tracing` macros and inherits whatever subscriber this installed.

use tracing_subscriber::EnvFilter;

/// Build the env filter used by the global subscriber, honoring `RUST_LOG` when set and
/// otherwise falling back to the level resolved from config/CLI (`ConfigFile::log_level`).
pub(crate) fn build_loglevel_filter_layer(configured_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(configured_level))
}

/// Install the global tracing subscriber. Call exactly once, before anything else logs.
pub fn init_logging(configured_level: &str) {
    let filter = build_loglevel_filter_layer(configured_level);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
