//! Query executor
//!
//! Runs backend-native queries for a resolved [`ScenarioContext`] through
//! the handle cache and retry policy, then normalizes the answer. Callers
//! that speak the request envelope go through [`QueryExecutor::handle`],
//! which never fails: errors come back as `{"error": "..."}`.

mod normalize;

pub use normalize::{element_row, normalize, Column, ColumnType, NormalizedResult, VALUE_COLUMN};

use crate::access::BackendAccess;
use crate::context::{ContextResolver, ScenarioContext};
use scenario_backend::{
    BackendResult, DocumentStore, GraphBackend, QueryParams, Topology, TopologyRequest,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Query request body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Backend-native query text
    pub query: String,
    /// Named parameters
    #[serde(default)]
    pub kwargs: QueryParams,
}

impl QueryRequest {
    /// Request without parameters
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            kwargs: QueryParams::new(),
        }
    }

    /// Add a parameter
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }
}

/// Query response body: a table or an error, never both
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryResponse {
    /// Failure description
    Error {
        /// Error text
        error: String,
    },
    /// Normalized table
    Table(NormalizedResult),
}

impl QueryResponse {
    /// Table, if the query succeeded
    #[must_use]
    pub fn table(&self) -> Option<&NormalizedResult> {
        match self {
            Self::Table(table) => Some(table),
            Self::Error { .. } => None,
        }
    }

    /// Error text, if the query failed
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Error { error } => Some(error),
            Self::Table(_) => None,
        }
    }
}

/// Executes queries against scenario backends
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    access: Arc<BackendAccess>,
    resolver: ContextResolver,
    graph_kind: String,
    document_kind: String,
}

impl QueryExecutor {
    /// Create executor; `graph_kind` is the fallback for unrecorded scenarios
    #[must_use]
    pub fn new(
        access: Arc<BackendAccess>,
        resolver: ContextResolver,
        graph_kind: impl Into<String>,
        document_kind: impl Into<String>,
    ) -> Self {
        Self {
            access,
            resolver,
            graph_kind: graph_kind.into(),
            document_kind: document_kind.into(),
        }
    }

    /// Context for an inbound graph identifier
    #[must_use]
    pub fn resolve(&self, graph_header: &str) -> ScenarioContext {
        self.resolver.resolve(graph_header, &self.graph_kind)
    }

    /// Run a graph query
    ///
    /// # Errors
    /// Returns the backend error after retries, including
    /// [`scenario_backend::BackendError::Unsupported`] and invalid-query errors.
    pub async fn execute(
        &self,
        ctx: &ScenarioContext,
        query: &str,
        kwargs: &QueryParams,
    ) -> BackendResult<NormalizedResult> {
        self.execute_cancellable(ctx, query, kwargs, &CancellationToken::new())
            .await
    }

    /// Run a graph query that stops retrying when `cancel` fires
    ///
    /// # Errors
    /// As [`QueryExecutor::execute`], plus
    /// [`scenario_backend::BackendError::Cancelled`].
    #[tracing::instrument(skip(self, kwargs, cancel), fields(scenario = %ctx.scenario_id, kind = %ctx.backend_kind))]
    pub async fn execute_cancellable(
        &self,
        ctx: &ScenarioContext,
        query: &str,
        kwargs: &QueryParams,
        cancel: &CancellationToken,
    ) -> BackendResult<NormalizedResult> {
        let raw = self
            .access
            .graph_call(ctx, "query", cancel, |g| async move {
                g.execute(query, kwargs).await
            })
            .await?;
        tracing::debug!(items = raw.len(), "query returned");
        Ok(normalize(raw))
    }

    /// Run a document query against one of the scenario's containers
    ///
    /// `container` is the logical name; the scope prefix is applied here.
    ///
    /// # Errors
    /// Returns the backend error after retries.
    #[tracing::instrument(skip(self, kwargs), fields(scenario = %ctx.scenario_id))]
    pub async fn query_documents(
        &self,
        ctx: &ScenarioContext,
        container: &str,
        query: &str,
        kwargs: &QueryParams,
    ) -> BackendResult<NormalizedResult> {
        let physical = ctx.container(container);
        let physical = physical.as_str();
        let raw = self
            .access
            .document_call(
                &self.document_kind,
                ctx,
                "document_query",
                &CancellationToken::new(),
                |s| async move { s.query(physical, query, kwargs).await },
            )
            .await?;
        Ok(normalize(raw))
    }

    /// Read the scenario graph, optionally filtered
    ///
    /// # Errors
    /// Returns [`scenario_backend::BackendError::Unsupported`] when the bound
    /// backend cannot apply the requested filter.
    pub async fn topology(&self, ctx: &ScenarioContext, request: &TopologyRequest) -> BackendResult<Topology> {
        self.access
            .graph_call(ctx, "topology", &CancellationToken::new(), |g| async move {
                g.topology(request).await
            })
            .await
    }

    /// Resolve, execute and wrap in the response envelope
    pub async fn handle(&self, graph_header: &str, request: QueryRequest) -> QueryResponse {
        let ctx = self.resolve(graph_header);
        match self.execute(&ctx, &request.query, &request.kwargs).await {
            Ok(table) => QueryResponse::Table(table),
            Err(e) => {
                tracing::warn!(graph = graph_header, error = %e, "query failed");
                QueryResponse::Error {
                    error: e.to_string(),
                }
            }
        }
    }
}
