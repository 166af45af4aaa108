//! Structured logging setup.
//!
//! Grounded on `itsmontoya-scribble/src/logging.rs`: a `tracing_subscriber`
//! `EnvFilter` seeded from an environment variable, with a JSON formatting
//! layer for machine-readable output. Unlike scribble (which gates this
//! behind a `logging` feature since it's a library first), camwatch's
//! daemon always logs — the default level comes from config rather than a
//! hardcoded fallback, since `general.log_level` is a first-class setting.

use tracing_subscriber::EnvFilter;

use crate::config::LogLevel;

const ENV_VAR: &str = "CAMWATCH_LOG";

/// Initialize the global tracing subscriber. Call once, at process start.
pub fn init(default_level: LogLevel) {
    let filter = EnvFilter::try_from_env(ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(default_level.as_tracing_level().to_string()));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
