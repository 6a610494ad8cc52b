//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the logging subsystem for binaries and tests
//! - Configure log level from `RUST_LOG` with a config fallback
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - The library only emits events; installing a subscriber is the caller's choice

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a global fmt subscriber.
///
/// `default_filter` (e.g. "info" or "sql_cluster=debug") applies when `RUST_LOG`
/// is unset. Fails if a global subscriber is already installed.
pub fn init(default_filter: &str) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
}
