//! Testing utilities for the scenario platform workspace
//!
//! Shared fixtures and fault-injecting backends.

#![allow(missing_docs)]

pub mod faults;
pub mod fixtures;

pub use faults::{CountingGraphFactory, FaultyGraph, Operation, QueuedGraphFactory};
pub use fixtures::{router_scenario, ScenarioFixture, ROUTER_MANIFEST};

use scenario_backend::{BackendRegistry, GraphBackendFactory};
use std::sync::Arc;

/// Built-in registry plus one extra graph kind
pub fn registry_with_graph(kind: &str, factory: Arc<dyn GraphBackendFactory>) -> BackendRegistry {
    let mut registry = BackendRegistry::with_builtins().unwrap();
    registry.register_graph(kind, factory).unwrap();
    registry
}
