//! Structured logging setup.

use tracing_subscriber::{fmt, EnvFilter};

/// Install a `tracing` subscriber reading `RUST_LOG`, defaulting to `info`.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();
}
