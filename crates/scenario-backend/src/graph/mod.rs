//! Built-in graph backends and their query languages

pub mod cluster;
pub mod gremlin;
pub mod mock;
pub mod phrase;

pub use cluster::{ClusterGraphBackend, ClusterGraphFactory};
pub use mock::{MockGraphBackend, MockGraphFactory};
