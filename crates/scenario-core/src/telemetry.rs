//! Tracing bootstrap

use crate::config::{LogConfig, LogFormat};
use crate::error::PlatformError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over `config.filter`. Returns `Ok(false)` when a global
/// subscriber was already installed, by this function or anyone else.
///
/// # Errors
/// Returns [`PlatformError::Telemetry`] if the filter directives do not parse.
pub fn init_tracing(config: &LogConfig) -> Result<bool, PlatformError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter)
            .map_err(|e| PlatformError::Telemetry(format!("bad filter '{}': {e}", config.filter)))?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init(),
    };
    Ok(installed.is_ok())
}
