#![forbid(unsafe_code)]

//! Optional fmt subscriber for applications embedding nbwire.

use tracing_subscriber::EnvFilter;

use crate::error::RuntimeError;

/// Environment variable holding the filter directive.
pub const LOG_ENV: &str = "NBWIRE_LOG";

/// Install a global fmt subscriber filtered by `NBWIRE_LOG` (default `warn`).
///
/// # Errors
///
/// [`RuntimeError::Logging`] if a global subscriber is already set.
pub fn init() -> Result<(), RuntimeError> {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|err| RuntimeError::Logging(err.to_string()))
}
