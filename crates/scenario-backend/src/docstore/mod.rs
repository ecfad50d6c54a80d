//! Built-in document stores and their query language

pub mod file;
pub mod memory;
pub mod query;

pub use file::{FileDocumentFactory, FileDocumentStore};
pub use memory::{MemoryDocumentFactory, MemoryDocumentStore};
pub use query::DocumentQuery;
