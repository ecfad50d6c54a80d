//! Fault-injecting backends and instrumented factories

use async_trait::async_trait;
use parking_lot::Mutex;
use scenario_backend::graph::MockGraphBackend;
use scenario_backend::{
    BackendClients, BackendHandle, BackendResult, BackendError, ConnectTarget, EdgeRecord,
    GraphBackend, GraphBackendFactory, Provisioner, QueryParams, RawResult, Topology,
    TopologyRequest, VertexRecord,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Graph backend operations that can be scripted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    UpsertVertex,
    UpsertEdge,
    Execute,
    Topology,
}

#[derive(Default)]
struct Script {
    once: HashMap<Operation, VecDeque<BackendError>>,
    always: HashMap<Operation, BackendError>,
    records: HashMap<String, BackendError>,
    calls: HashMap<Operation, u32>,
}

/// Wraps a graph backend and fails calls on request
pub struct FaultyGraph {
    inner: Arc<dyn GraphBackend>,
    script: Mutex<Script>,
    delay: Option<Duration>,
    closes: AtomicU32,
}

impl FaultyGraph {
    pub fn new(inner: Arc<dyn GraphBackend>) -> Self {
        Self {
            inner,
            script: Mutex::new(Script::default()),
            delay: None,
            closes: AtomicU32::new(0),
        }
    }

    /// Over an empty `mock` graph
    pub fn over_mock() -> Self {
        Self::new(Arc::new(MockGraphBackend::empty()))
    }

    /// Sleep before every data call
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail the next call of `op` with `error` (queued in order)
    pub fn fail_next(&self, op: Operation, error: BackendError) -> &Self {
        self.script.lock().once.entry(op).or_default().push_back(error);
        self
    }

    /// Fail every call of `op` with `error`
    pub fn fail_always(&self, op: Operation, error: BackendError) -> &Self {
        self.script.lock().always.insert(op, error);
        self
    }

    /// Fail every write of the vertex or edge with this id
    pub fn fail_record(&self, id: &str, error: BackendError) -> &Self {
        self.script.lock().records.insert(id.to_string(), error);
        self
    }

    /// Calls made to `op`, failed ones included
    pub fn calls(&self, op: Operation) -> u32 {
        self.script.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Times `close` was called
    pub fn closes(&self) -> u32 {
        self.closes.load(Ordering::SeqCst)
    }

    async fn enter(&self, op: Operation, record: Option<&str>) -> BackendResult<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut script = self.script.lock();
        *script.calls.entry(op).or_default() += 1;
        if let Some(error) = record.and_then(|id| script.records.get(id)) {
            return Err(error.clone());
        }
        if let Some(error) = script.once.get_mut(&op).and_then(VecDeque::pop_front) {
            return Err(error);
        }
        if let Some(error) = script.always.get(&op) {
            return Err(error.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl BackendHandle for FaultyGraph {
    fn kind(&self) -> &str {
        self.inner.kind()
    }

    async fn close(&self) -> BackendResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close().await
    }
}

#[async_trait]
impl GraphBackend for FaultyGraph {
    async fn upsert_vertex(&self, vertex: &VertexRecord) -> BackendResult<()> {
        self.enter(Operation::UpsertVertex, Some(&vertex.id)).await?;
        self.inner.upsert_vertex(vertex).await
    }

    async fn upsert_edge(&self, edge: &EdgeRecord) -> BackendResult<()> {
        self.enter(Operation::UpsertEdge, Some(&edge.id)).await?;
        self.inner.upsert_edge(edge).await
    }

    async fn execute(&self, query: &str, params: &QueryParams) -> BackendResult<RawResult> {
        self.enter(Operation::Execute, None).await?;
        self.inner.execute(query, params).await
    }

    async fn topology(&self, request: &TopologyRequest) -> BackendResult<Topology> {
        self.enter(Operation::Topology, None).await?;
        self.inner.topology(request).await
    }

    fn provisioner(&self) -> Option<&dyn Provisioner> {
        self.inner.provisioner()
    }
}

/// Wraps a factory, counting connects and optionally slowing them down
pub struct CountingGraphFactory {
    inner: Arc<dyn GraphBackendFactory>,
    connects: AtomicU32,
    delay: Duration,
}

impl CountingGraphFactory {
    pub fn new(inner: Arc<dyn GraphBackendFactory>) -> Self {
        Self {
            inner,
            connects: AtomicU32::new(0),
            delay: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GraphBackendFactory for CountingGraphFactory {
    async fn connect(
        &self,
        target: &ConnectTarget,
        clients: &BackendClients,
    ) -> BackendResult<Arc<dyn GraphBackend>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.connect(target, clients).await
    }
}

/// Hands out prepared handles in order, repeating the last one
pub struct QueuedGraphFactory {
    handles: Mutex<VecDeque<Arc<dyn GraphBackend>>>,
    connects: AtomicU32,
}

impl QueuedGraphFactory {
    pub fn new(handles: Vec<Arc<dyn GraphBackend>>) -> Self {
        assert!(!handles.is_empty(), "queue needs at least one handle");
        Self {
            handles: Mutex::new(handles.into()),
            connects: AtomicU32::new(0),
        }
    }

    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GraphBackendFactory for QueuedGraphFactory {
    async fn connect(
        &self,
        _target: &ConnectTarget,
        _clients: &BackendClients,
    ) -> BackendResult<Arc<dyn GraphBackend>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let mut handles = self.handles.lock();
        let handle = if handles.len() > 1 {
            handles.pop_front()
        } else {
            handles.front().cloned()
        };
        handle.ok_or_else(|| BackendError::Internal("no handles queued".into()))
    }
}
