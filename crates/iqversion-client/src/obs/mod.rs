//! Observability: per-connection counters and tracing setup.

pub mod metrics;

use tracing_subscriber::{fmt, EnvFilter};

/// Install a `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// `default_directives` when unset or invalid.
///
/// Returns false if a global subscriber was already installed.
pub fn init_tracing(default_directives: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));
    fmt().with_env_filter(filter).try_init().is_ok()
}
