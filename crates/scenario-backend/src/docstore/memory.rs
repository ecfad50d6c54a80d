//! `memory` kind: document containers in the shared in-memory cluster

use crate::clients::BackendClients;
use crate::docstore::query;
use crate::error::{BackendError, BackendResult, RegistryError};
use crate::memory::{MemoryCluster, SharedContainer};
use crate::registry::BackendRegistry;
use crate::traits::{BackendHandle, ConnectTarget, DocumentStore, DocumentStoreFactory, Provisioner};
use crate::types::{Document, ProvisionOutcome, QueryParams, RawResult, ResourceSpec};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Registered kind
pub const KIND: &str = "memory";

/// Handle over the cluster's containers
#[derive(Debug)]
pub struct MemoryDocumentStore {
    cluster: Arc<MemoryCluster>,
    closed: AtomicBool,
}

impl MemoryDocumentStore {
    /// Create handle
    #[must_use]
    pub fn new(cluster: Arc<MemoryCluster>) -> Self {
        Self {
            cluster,
            closed: AtomicBool::new(false),
        }
    }

    fn container(&self, name: &str) -> BackendResult<SharedContainer> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BackendError::ConnectionLost("document handle is closed".into()));
        }
        self.cluster.container(name)
    }
}

#[async_trait]
impl BackendHandle for MemoryDocumentStore {
    fn kind(&self) -> &str {
        KIND
    }

    async fn close(&self) -> BackendResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn upsert(&self, container: &str, document: &Document) -> BackendResult<()> {
        self.container(container)?.write().upsert(document.clone());
        Ok(())
    }

    async fn query(&self, container: &str, text: &str, params: &QueryParams) -> BackendResult<RawResult> {
        let parsed = query::parse(text)?;
        let shared = self.container(container)?;
        let guard = shared.read();
        parsed.evaluate(guard.documents().map(|d| &d.body), params)
    }

    fn provisioner(&self) -> Option<&dyn Provisioner> {
        Some(self)
    }
}

#[async_trait]
impl Provisioner for MemoryDocumentStore {
    async fn ensure_exists(&self, spec: &ResourceSpec) -> BackendResult<ProvisionOutcome> {
        let ResourceSpec::Container {
            name,
            partition_key_path,
        } = spec
        else {
            return Err(BackendError::unsupported(KIND, format!("provisioning {spec}")));
        };
        self.cluster.create_container(name, partition_key_path)?;
        tracing::info!(resource = %spec, "provisioned");
        Ok(ProvisionOutcome::Created)
    }
}

/// Factory for [`MemoryDocumentStore`]
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryDocumentFactory;

#[async_trait]
impl DocumentStoreFactory for MemoryDocumentFactory {
    async fn connect(
        &self,
        _target: &ConnectTarget,
        clients: &BackendClients,
    ) -> BackendResult<Arc<dyn DocumentStore>> {
        Ok(Arc::new(MemoryDocumentStore::new(Arc::clone(clients.cluster()))))
    }
}

/// Register this kind
///
/// # Errors
/// Fails if the kind is already registered.
pub fn register(registry: &mut BackendRegistry) -> Result<(), RegistryError> {
    registry.register_documents(KIND, Arc::new(MemoryDocumentFactory))
}
