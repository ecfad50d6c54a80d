//! In-process cluster backing the `graph` and `memory` kinds
//!
//! A [`MemoryCluster`] plays the part of a remote database account: graphs
//! and containers live in it independently of any handle, so closing or
//! evicting a handle loses no data and a new handle sees everything the
//! old one wrote.

mod container;
mod graph;

pub use container::MemoryContainer;
pub use graph::{value_text, PropertyGraph, StoredEdge, StoredVertex};

use crate::error::{BackendError, BackendResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Shared, lockable graph
pub type SharedGraph = Arc<RwLock<PropertyGraph>>;

/// Shared, lockable container
pub type SharedContainer = Arc<RwLock<MemoryContainer>>;

/// Named graphs and document containers
#[derive(Debug, Default)]
pub struct MemoryCluster {
    graphs: RwLock<HashMap<String, SharedGraph>>,
    containers: RwLock<HashMap<String, SharedContainer>>,
}

impl MemoryCluster {
    /// Create empty cluster
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a graph
    ///
    /// # Errors
    /// Returns [`BackendError::Conflict`] if the graph exists.
    pub fn create_graph(&self, name: &str, partition_key: &str) -> BackendResult<()> {
        let mut graphs = self.graphs.write();
        if graphs.contains_key(name) {
            return Err(BackendError::Conflict(format!("graph '{name}' already exists")));
        }
        graphs.insert(
            name.to_string(),
            Arc::new(RwLock::new(PropertyGraph::new(partition_key))),
        );
        Ok(())
    }

    /// Look up a graph
    ///
    /// # Errors
    /// Returns [`BackendError::NotFound`] if it was never provisioned.
    pub fn graph(&self, name: &str) -> BackendResult<SharedGraph> {
        self.graphs
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("graph '{name}' is not provisioned")))
    }

    /// Create a document container
    ///
    /// # Errors
    /// Returns [`BackendError::Conflict`] if the container exists.
    pub fn create_container(&self, name: &str, partition_key_path: &str) -> BackendResult<()> {
        let mut containers = self.containers.write();
        if containers.contains_key(name) {
            return Err(BackendError::Conflict(format!("container '{name}' already exists")));
        }
        containers.insert(
            name.to_string(),
            Arc::new(RwLock::new(MemoryContainer::new(partition_key_path))),
        );
        Ok(())
    }

    /// Look up a container
    ///
    /// # Errors
    /// Returns [`BackendError::NotFound`] if it was never provisioned.
    pub fn container(&self, name: &str) -> BackendResult<SharedContainer> {
        self.containers
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("container '{name}' is not provisioned")))
    }

    /// Graph names, sorted
    #[must_use]
    pub fn graph_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.graphs.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Container names, sorted
    #[must_use]
    pub fn container_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.containers.read().keys().cloned().collect();
        names.sort();
        names
    }
}
