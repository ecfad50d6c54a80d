//! Backend capability traits
//!
//! A backend handle is a long-lived client bound to one scenario scope.
//! Graph backends and document stores are separate families; each has a
//! factory trait that the [`crate::BackendRegistry`] stores by kind.

use crate::clients::BackendClients;
use crate::error::{BackendError, BackendResult, Retryability};
use crate::types::{
    Document, EdgeRecord, ProvisionOutcome, QueryParams, RawResult, ResourceSpec, Topology,
    TopologyRequest, VertexRecord,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Behaviour shared by every cached handle
#[async_trait]
pub trait BackendHandle: Send + Sync {
    /// Registered kind of this backend
    fn kind(&self) -> &str;

    /// Classify a failure raised by this backend
    fn classify(&self, error: &BackendError) -> Retryability {
        error.default_retryability()
    }

    /// Release the underlying connection
    async fn close(&self) -> BackendResult<()>;
}

/// Control-plane capability: create resources that may already exist
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Create `spec`
    ///
    /// May report an existing resource either as
    /// `Ok(ProvisionOutcome::AlreadyExists)` or as
    /// `Err(BackendError::Conflict)`; callers go through [`ensure_exists`].
    async fn ensure_exists(&self, spec: &ResourceSpec) -> BackendResult<ProvisionOutcome>;
}

/// Idempotent ensure-exists: a conflict counts as success
///
/// # Errors
/// Returns every non-conflict failure unchanged.
pub async fn ensure_exists(
    provisioner: &dyn Provisioner,
    spec: &ResourceSpec,
) -> BackendResult<ProvisionOutcome> {
    match provisioner.ensure_exists(spec).await {
        Err(e) if e.is_conflict() => {
            tracing::debug!(resource = %spec, "resource already exists");
            Ok(ProvisionOutcome::AlreadyExists)
        }
        other => other,
    }
}

/// A graph database bound to one scenario graph
#[async_trait]
pub trait GraphBackend: BackendHandle {
    /// Insert or replace a vertex by id
    async fn upsert_vertex(&self, vertex: &VertexRecord) -> BackendResult<()>;

    /// Insert or replace an edge by id, resolving both endpoints
    ///
    /// Fails with [`BackendError::InvalidRecord`] when an endpoint matches
    /// no vertex.
    async fn upsert_edge(&self, edge: &EdgeRecord) -> BackendResult<()>;

    /// Run a native query with named parameters
    async fn execute(&self, query: &str, params: &QueryParams) -> BackendResult<RawResult>;

    /// Read the graph, optionally filtered
    async fn topology(&self, _request: &TopologyRequest) -> BackendResult<Topology> {
        Err(BackendError::unsupported(self.kind(), "topology reads"))
    }

    /// Control-plane access, when this backend can create resources
    fn provisioner(&self) -> Option<&dyn Provisioner> {
        None
    }
}

/// A document database bound to one dataset scope
#[async_trait]
pub trait DocumentStore: BackendHandle {
    /// Insert or replace a document by (partition, id)
    async fn upsert(&self, container: &str, document: &Document) -> BackendResult<()>;

    /// Run a native query against one container
    async fn query(&self, container: &str, query: &str, params: &QueryParams) -> BackendResult<RawResult>;

    /// Control-plane access, when this store can create containers
    fn provisioner(&self) -> Option<&dyn Provisioner> {
        None
    }
}

/// What a new handle is bound to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectTarget {
    /// Cache scope: scenario id for graphs, dataset scope prefix for stores
    pub scope: String,
    /// Physical resource the handle talks to (graph name or scope prefix)
    pub resource: String,
}

impl ConnectTarget {
    /// Create target
    pub fn new(scope: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            resource: resource.into(),
        }
    }
}

/// Constructs graph backend handles of one kind
#[async_trait]
pub trait GraphBackendFactory: Send + Sync {
    /// Open a handle
    async fn connect(
        &self,
        target: &ConnectTarget,
        clients: &BackendClients,
    ) -> BackendResult<Arc<dyn GraphBackend>>;
}

/// Constructs document store handles of one kind
#[async_trait]
pub trait DocumentStoreFactory: Send + Sync {
    /// Open a handle
    async fn connect(
        &self,
        target: &ConnectTarget,
        clients: &BackendClients,
    ) -> BackendResult<Arc<dyn DocumentStore>>;
}
