//! Shared clients handed to backend factories
//!
//! Factories never reach for process-wide state; everything a handle needs
//! to talk to its service is passed in here.

use crate::blocking::BlockingPool;
use crate::memory::MemoryCluster;
use std::path::PathBuf;
use std::sync::Arc;

/// Explicit client configuration for all backend kinds
#[derive(Debug, Clone, Default)]
pub struct BackendClients {
    cluster: Arc<MemoryCluster>,
    document_root: Option<PathBuf>,
    blocking: BlockingPool,
}

impl BackendClients {
    /// Create clients around a fresh in-memory cluster
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an existing cluster
    #[must_use]
    pub fn with_cluster(mut self, cluster: Arc<MemoryCluster>) -> Self {
        self.cluster = cluster;
        self
    }

    /// Root directory for file-backed document stores
    #[must_use]
    pub fn with_document_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.document_root = Some(root.into());
        self
    }

    /// Pool for blocking IO
    #[must_use]
    pub fn with_blocking_pool(mut self, pool: BlockingPool) -> Self {
        self.blocking = pool;
        self
    }

    /// The in-memory cluster behind the `graph` and `memory` kinds
    #[inline]
    #[must_use]
    pub fn cluster(&self) -> &Arc<MemoryCluster> {
        &self.cluster
    }

    /// Root directory for the `file` kind, if configured
    #[inline]
    #[must_use]
    pub fn document_root(&self) -> Option<&std::path::Path> {
        self.document_root.as_deref()
    }

    /// Blocking pool
    #[inline]
    #[must_use]
    pub fn blocking(&self) -> &BlockingPool {
        &self.blocking
    }
}
