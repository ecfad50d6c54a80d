//! Scenario platform core
//!
//! Loads scenario data into pluggable backends and answers queries
//! against it, one scenario at a time:
//!
//! - **Context**: every graph identifier resolves to the scenario, graph
//!   name and document scope it addresses ([`context`])
//! - **Ingestion**: a state machine that validates, provisions and writes,
//!   streaming progress as it goes ([`ingest`])
//! - **Queries**: backend-native queries, normalized into one tabular
//!   shape ([`query`])
//! - **Platform**: configuration, tracing and the wiring between them
//!   ([`platform`], [`config`], [`telemetry`])
//!
//! # Example
//!
//! ```rust,ignore
//! use scenario_core::prelude::*;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let platform = Platform::new(PlatformConfig::load("platform.toml")?.with_process_env())?;
//!
//! let manifest = Manifest::load("scenarios/telco-noc/scenario.yaml")?;
//! let job = IngestJob::new("telco-noc", manifest, "scenarios/telco-noc");
//! let result = platform.ingest(job, &CancellationToken::new()).await?;
//! println!("{} vertices, {} failures", result.vertices, result.failures.len());
//!
//! let response = platform
//!     .query("telco-noc-topology", QueryRequest::new("count vertices labeled Router"))
//!     .await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod access;
pub mod config;
pub mod context;
pub mod error;
pub mod ingest;
pub mod platform;
pub mod query;
pub mod telemetry;

pub use access::{is_run_terminating, BackendAccess};
pub use config::{LogConfig, LogFormat, PlatformConfig};
pub use context::{derive, ContextResolver, ScenarioCatalog, ScenarioContext};
pub use error::{ConfigError, IngestError, IngestFailure, IngestResult, PlatformError};
pub use ingest::{
    IngestEvent, IngestJob, IngestRun, IngestState, IngestionEngine, IngestionResult,
    ProvisionSummary, RowFailure,
};
pub use platform::Platform;
pub use query::{Column, ColumnType, NormalizedResult, QueryExecutor, QueryRequest, QueryResponse};
pub use telemetry::init_tracing;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for running a platform
    pub use crate::{
        IngestEvent, IngestJob, IngestState, IngestionResult, NormalizedResult, Platform,
        PlatformConfig, QueryRequest, QueryResponse, ScenarioContext,
    };
    pub use scenario_manifest::Manifest;
    pub use tokio_util::sync::CancellationToken;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
