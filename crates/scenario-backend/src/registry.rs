//! Backend registry
//!
//! Maps a backend kind string to the factory that builds handles of that
//! kind. Each built-in module contributes its own `register` function, so
//! adding a backend never touches a central switch. The registry is filled
//! once at startup and read-only afterwards.

use crate::docstore;
use crate::error::{BackendError, BackendResult, RegistryError};
use crate::graph;
use crate::traits::{DocumentStoreFactory, GraphBackendFactory};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Kind string to factory, per backend family
#[derive(Default, Clone)]
pub struct BackendRegistry {
    graphs: BTreeMap<String, Arc<dyn GraphBackendFactory>>,
    documents: BTreeMap<String, Arc<dyn DocumentStoreFactory>>,
}

impl BackendRegistry {
    /// Create empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create registry with every built-in kind
    ///
    /// # Errors
    /// Fails only if two built-ins claim one kind.
    pub fn with_builtins() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        graph::cluster::register(&mut registry)?;
        graph::mock::register(&mut registry)?;
        docstore::memory::register(&mut registry)?;
        docstore::file::register(&mut registry)?;
        Ok(registry)
    }

    /// Register a graph backend factory
    ///
    /// # Errors
    /// Returns [`RegistryError::Duplicate`] if `kind` is taken.
    pub fn register_graph(
        &mut self,
        kind: &str,
        factory: Arc<dyn GraphBackendFactory>,
    ) -> Result<(), RegistryError> {
        if self.graphs.contains_key(kind) {
            return Err(RegistryError::Duplicate {
                family: "graph",
                kind: kind.to_string(),
            });
        }
        tracing::debug!(kind, "registered graph backend");
        self.graphs.insert(kind.to_string(), factory);
        Ok(())
    }

    /// Register a document store factory
    ///
    /// # Errors
    /// Returns [`RegistryError::Duplicate`] if `kind` is taken.
    pub fn register_documents(
        &mut self,
        kind: &str,
        factory: Arc<dyn DocumentStoreFactory>,
    ) -> Result<(), RegistryError> {
        if self.documents.contains_key(kind) {
            return Err(RegistryError::Duplicate {
                family: "document",
                kind: kind.to_string(),
            });
        }
        tracing::debug!(kind, "registered document store");
        self.documents.insert(kind.to_string(), factory);
        Ok(())
    }

    /// Graph factory for `kind`
    ///
    /// # Errors
    /// Returns [`BackendError::UnknownKind`] listing the registered kinds.
    pub fn graph_factory(&self, kind: &str) -> BackendResult<Arc<dyn GraphBackendFactory>> {
        self.graphs
            .get(kind)
            .cloned()
            .ok_or_else(|| BackendError::UnknownKind {
                family: "graph",
                kind: kind.to_string(),
                known: self.graph_kinds().join(", "),
            })
    }

    /// Document store factory for `kind`
    ///
    /// # Errors
    /// Returns [`BackendError::UnknownKind`] listing the registered kinds.
    pub fn document_factory(&self, kind: &str) -> BackendResult<Arc<dyn DocumentStoreFactory>> {
        self.documents
            .get(kind)
            .cloned()
            .ok_or_else(|| BackendError::UnknownKind {
                family: "document",
                kind: kind.to_string(),
                known: self.document_kinds().join(", "),
            })
    }

    /// Registered graph kinds, sorted
    #[must_use]
    pub fn graph_kinds(&self) -> Vec<&str> {
        self.graphs.keys().map(String::as_str).collect()
    }

    /// Registered document kinds, sorted
    #[must_use]
    pub fn document_kinds(&self) -> Vec<&str> {
        self.documents.keys().map(String::as_str).collect()
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("graphs", &self.graph_kinds())
            .field("documents", &self.document_kinds())
            .finish()
    }
}
