//! Scenario context resolution
//!
//! Every request names its scenario through one opaque graph identifier
//! (`telco-noc-topology`). From it the resolver derives:
//!
//! - the scenario id, which keys the graph handle cache
//! - the dataset scope prefix that document containers are namespaced under
//! - the backend kind the scenario is bound to
//!
//! Identifiers recorded by ingestion in the [`ScenarioCatalog`] resolve to
//! exactly what was provisioned. Anything else falls back to splitting on
//! the rightmost separator through [`scenario_manifest::naming`], the same
//! functions ingestion uses to build the names.

use dashmap::DashMap;
use scenario_backend::ConnectTarget;
use scenario_manifest::naming;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Scoped names for one request
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScenarioContext {
    /// Scenario id; graph handle cache scope
    pub scenario_id: String,
    /// Physical graph the scenario's vertices and edges live in
    pub graph_name: String,
    /// Registered graph backend kind
    pub backend_kind: String,
    /// Prefix of the scenario's document containers
    pub dataset_scope_prefix: String,
}

impl ScenarioContext {
    /// Context for a scenario as ingestion names it
    #[must_use]
    pub fn for_scenario(scenario_id: impl Into<String>, backend_kind: impl Into<String>) -> Self {
        let scenario_id = scenario_id.into();
        Self {
            graph_name: naming::graph_name(&scenario_id),
            dataset_scope_prefix: scenario_id.clone(),
            scenario_id,
            backend_kind: backend_kind.into(),
        }
    }

    /// Bind to a different backend kind
    #[inline]
    #[must_use]
    pub fn with_backend_kind(mut self, kind: impl Into<String>) -> Self {
        self.backend_kind = kind.into();
        self
    }

    /// Connect target for the scenario graph
    #[must_use]
    pub fn graph_target(&self) -> ConnectTarget {
        ConnectTarget::new(&self.scenario_id, &self.graph_name)
    }

    /// Connect target for the scenario's document scope
    #[must_use]
    pub fn document_target(&self) -> ConnectTarget {
        ConnectTarget::new(&self.dataset_scope_prefix, &self.dataset_scope_prefix)
    }

    /// Physical name of a logical container
    #[must_use]
    pub fn container(&self, name: &str) -> String {
        naming::scoped_container(&self.dataset_scope_prefix, name)
    }
}

/// Graph identifiers recorded at provisioning time
///
/// Read-mostly; written once per successful provisioning.
#[derive(Debug, Default)]
pub struct ScenarioCatalog {
    entries: DashMap<String, ScenarioContext>,
}

impl ScenarioCatalog {
    /// Create empty catalog
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a provisioned scenario under its graph name
    pub fn record(&self, context: ScenarioContext) {
        tracing::debug!(graph = %context.graph_name, scenario = %context.scenario_id, "recorded scenario");
        self.entries.insert(context.graph_name.clone(), context);
    }

    /// Context recorded for `graph_name`
    #[must_use]
    pub fn lookup(&self, graph_name: &str) -> Option<ScenarioContext> {
        self.entries.get(graph_name).map(|entry| entry.value().clone())
    }

    /// Drop a recorded scenario
    pub fn forget(&self, graph_name: &str) -> Option<ScenarioContext> {
        self.entries.remove(graph_name).map(|(_, context)| context)
    }

    /// Recorded scenario ids, sorted
    #[must_use]
    pub fn scenarios(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.iter().map(|e| e.scenario_id.clone()).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Number of recorded graph names
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Derive a context from an identifier alone
///
/// `telco-noc-topology` gives scenario `telco-noc` with prefix `telco-noc`.
/// An identifier without a separator is its own scenario id and uses
/// `fallback_scope` as prefix.
#[must_use]
pub fn derive(raw: &str, fallback_kind: &str, fallback_scope: &str) -> ScenarioContext {
    let raw = raw.trim();
    let (scenario_id, prefix) = match naming::split_graph_name(raw) {
        Some((scenario, _suffix)) => (scenario, scenario),
        None => (raw, fallback_scope),
    };
    ScenarioContext {
        scenario_id: scenario_id.to_string(),
        graph_name: raw.to_string(),
        backend_kind: fallback_kind.to_string(),
        dataset_scope_prefix: prefix.to_string(),
    }
}

/// Catalog-first context resolver
#[derive(Debug, Clone)]
pub struct ContextResolver {
    catalog: Arc<ScenarioCatalog>,
    fallback_scope: String,
}

impl ContextResolver {
    /// Create resolver
    #[must_use]
    pub fn new(catalog: Arc<ScenarioCatalog>, fallback_scope: impl Into<String>) -> Self {
        Self {
            catalog,
            fallback_scope: fallback_scope.into(),
        }
    }

    /// Context for an inbound graph identifier
    ///
    /// `fallback_kind` is used only when the identifier was never recorded.
    #[must_use]
    pub fn resolve(&self, raw: &str, fallback_kind: &str) -> ScenarioContext {
        if let Some(context) = self.catalog.lookup(raw.trim()) {
            return context;
        }
        derive(raw, fallback_kind, &self.fallback_scope)
    }

    /// Underlying catalog
    #[inline]
    #[must_use]
    pub fn catalog(&self) -> &ScenarioCatalog {
        &self.catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn resolver() -> ContextResolver {
        ContextResolver::new(Arc::new(ScenarioCatalog::new()), "shared")
    }

    #[test]
    fn strips_rightmost_segment() {
        let ctx = resolver().resolve("telco-noc-topology", "mock");
        assert_eq!(ctx.scenario_id, "telco-noc");
        assert_eq!(ctx.dataset_scope_prefix, "telco-noc");
        assert_eq!(ctx.graph_name, "telco-noc-topology");
        assert_eq!(ctx.backend_kind, "mock");
    }

    #[test]
    fn bare_identifier_uses_fallback_scope() {
        let ctx = resolver().resolve("topology", "graph");
        assert_eq!(ctx.scenario_id, "topology");
        assert_eq!(ctx.dataset_scope_prefix, "shared");
        assert_eq!(ctx.graph_name, "topology");
    }

    #[test]
    fn empty_side_counts_as_no_separator() {
        let ctx = resolver().resolve("-topology", "mock");
        assert_eq!(ctx.scenario_id, "-topology");
        assert_eq!(ctx.dataset_scope_prefix, "shared");
    }

    #[test]
    fn catalog_entry_wins_over_split() {
        let resolver = resolver();
        let recorded = ScenarioContext {
            scenario_id: "cloud-outage".into(),
            graph_name: "co-graph".into(),
            backend_kind: "graph".into(),
            dataset_scope_prefix: "cloud-outage".into(),
        };
        resolver.catalog().record(recorded.clone());

        assert_eq!(resolver.resolve("co-graph", "mock"), recorded);
        assert_eq!(resolver.resolve("co-other", "mock").scenario_id, "co");
    }

    #[test]
    fn ingestion_names_round_trip() {
        let ctx = ScenarioContext::for_scenario("telco-noc", "mock");
        assert_eq!(ctx.graph_name, "telco-noc-topology");
        assert_eq!(ctx.container("Alerts"), "telco-noc-Alerts");
        assert_eq!(resolver().resolve(&ctx.graph_name, "mock"), ctx);
    }

    proptest! {
        #[test]
        fn resolves_what_ingestion_names(id in "[a-z0-9]{1,8}(-[a-z0-9]{1,8}){0,3}") {
            let ingested = ScenarioContext::for_scenario(id.as_str(), "graph");
            let resolved = resolver().resolve(&ingested.graph_name, "graph");
            prop_assert_eq!(resolved, ingested);
        }
    }
}
