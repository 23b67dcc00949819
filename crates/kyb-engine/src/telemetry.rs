//! Tracing setup

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered by `RUST_LOG`, or `default_filter` when
/// it is unset
///
/// Safe to call more than once: returns `false` when a global subscriber was
/// already installed.
///
/// ```
/// kyb_engine::telemetry::init_tracing("kyb=info");
/// assert!(!kyb_engine::telemetry::init_tracing("kyb=debug"));
/// ```
pub fn init_tracing(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .is_ok()
}
