//! Error types for the scenario platform
//!
//! Provides error handling for:
//! - Configuration loading
//! - Platform startup (registry population, tracing)
//! - Ingestion runs, which always carry the partial result with them

use crate::ingest::{IngestState, IngestionResult};
use scenario_backend::{BackendError, RegistryError};
use scenario_manifest::{ManifestError, NamingError};
use std::path::PathBuf;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file unreadable
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config text is not valid TOML for the config shape
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// A setting is out of range
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Startup errors
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// Bad configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Backend registration failed
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Configured backend kind is not registered
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Tracing subscriber could not be built
    #[error("telemetry setup failed: {0}")]
    Telemetry(String),
}

/// Why an ingestion run stopped
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Manifest or data files failed validation
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Scenario id rejected by the naming rules
    #[error("invalid scenario id: {0}")]
    Naming(#[from] NamingError),

    /// A resource could not be created
    #[error("provisioning {resource} failed: {source}")]
    Provisioning {
        resource: String,
        #[source]
        source: BackendError,
    },

    /// A backend failure that ends the run
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// Engine tried to move between states that are not connected
    #[error("illegal ingestion transition {from} -> {to}")]
    IllegalTransition { from: IngestState, to: IngestState },
}

/// A failed run plus everything it wrote before failing
#[derive(Debug, thiserror::Error)]
#[error("ingestion of '{}' failed: {error}", .partial.scenario_id)]
pub struct IngestFailure {
    /// Cause
    #[source]
    pub error: IngestError,
    /// Counts and row failures up to the point of failure
    pub partial: IngestionResult,
}

/// Result alias for ingestion runs
pub type IngestResult<T> = Result<T, IngestFailure>;
