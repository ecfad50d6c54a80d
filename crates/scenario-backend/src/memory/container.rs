//! In-memory document container

use crate::types::Document;
use indexmap::IndexMap;

/// Documents of one container, keyed by (partition, id)
#[derive(Debug, Clone, Default)]
pub struct MemoryContainer {
    partition_key_path: String,
    documents: IndexMap<(String, String), Document>,
}

impl MemoryContainer {
    /// Create empty container
    pub fn new(partition_key_path: impl Into<String>) -> Self {
        Self {
            partition_key_path: partition_key_path.into(),
            documents: IndexMap::new(),
        }
    }

    /// Partition key path, e.g. `/RouterId`
    #[inline]
    #[must_use]
    pub fn partition_key_path(&self) -> &str {
        &self.partition_key_path
    }

    /// Insert or replace by (partition, id)
    pub fn upsert(&mut self, document: Document) {
        let key = (document.partition_key.clone(), document.id.clone());
        self.documents.insert(key, document);
    }

    /// Document by partition and id
    #[must_use]
    pub fn get(&self, partition_key: &str, id: &str) -> Option<&Document> {
        self.documents
            .get(&(partition_key.to_string(), id.to_string()))
    }

    /// All documents in insertion order
    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.documents.values()
    }

    /// Number of documents
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Whether the container is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
