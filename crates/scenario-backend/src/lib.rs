//! Pluggable backends for scenario data
//!
//! Graph databases and document stores sit behind two capability traits,
//! [`GraphBackend`] and [`DocumentStore`]. Around them:
//!
//! - **Registry**: kind string to factory, filled once at startup ([`registry`])
//! - **Cache**: one live handle per `(kind, scope)`, coalesced construction ([`cache`])
//! - **Retry**: exponential backoff driven by backend classification ([`retry`])
//! - **Blocking pool**: bounded `spawn_blocking` for disk-backed stores ([`blocking`])
//!
//! Built-in kinds:
//!
//! | family   | kind     | query language            | control plane |
//! |----------|----------|---------------------------|---------------|
//! | graph    | `graph`  | Gremlin subset            | yes           |
//! | graph    | `mock`   | phrase queries            | no            |
//! | document | `memory` | SQL subset                | yes           |
//! | document | `file`   | SQL subset                | yes           |

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod blocking;
pub mod cache;
pub mod clients;
pub mod docstore;
pub mod error;
pub mod graph;
pub mod memory;
pub mod registry;
pub mod retry;
pub mod traits;
pub mod types;

pub use blocking::BlockingPool;
pub use cache::{BackendCache, CacheKey, EvictionReport, HandleCache};
pub use clients::BackendClients;
pub use error::{BackendError, BackendResult, RegistryError, Retryability};
pub use memory::MemoryCluster;
pub use registry::BackendRegistry;
pub use retry::{with_retry, with_retry_cancellable, RetryPolicy};
pub use traits::{
    ensure_exists, BackendHandle, ConnectTarget, DocumentStore, DocumentStoreFactory, GraphBackend,
    GraphBackendFactory, Provisioner,
};
pub use types::{
    Document, EdgeRecord, ElementKind, EndpointRef, GraphElement, Properties, ProvisionOutcome,
    QueryParams, RawResult, ResourceSpec, Topology, TopologyRequest, VertexRecord,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
