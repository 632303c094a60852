//! Testing utilities for the subwatch workspace
//!
//! Shared fixtures: a fully wired in-memory monitor on a manual clock,
//! scripted retry operations and probes, and a store wrapper that fails on
//! demand.

#![allow(missing_docs)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use subwatch_core::{
    Clock, ComponentId, ComponentKind, DependencyError, EventQuery, ManualClock, MonitorConfig,
    NewProgressEvent, OperationError, OrderingPolicy, Page, Pathway, ProgressEvent, ProgressStatus, ProjectId,
    Stage, StoreError, SubmissionId, SubmissionRecord,
};
use subwatch_engine::{
    HealthProbe, Monitor, MonitorStores, OperationRegistry, RetryContext, RetryableOperation,
};
use subwatch_store::{EventStore, InMemoryEventStore, InMemorySubmissionDirectory, StoreResult};
use tokio::sync::watch;

/// Fixed start instant for deterministic tests
pub fn base_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-02T09:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// Retry operation that replays scripted outcomes
///
/// Falls back to `Ok(())` once the script runs out.
#[derive(Debug, Default)]
pub struct ScriptedOperation {
    outcomes: Mutex<VecDeque<Result<(), OperationError>>>,
    calls: Mutex<Vec<RetryContext>>,
}

impl ScriptedOperation {
    pub fn new(outcomes: Vec<Result<(), OperationError>>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
            calls: Mutex::default(),
        })
    }

    pub fn succeeding() -> Arc<Self> {
        Self::new(Vec::new())
    }

    pub fn failing_transient(times: usize) -> Arc<Self> {
        Self::new(
            (0..times)
                .map(|i| Err(OperationError::Transient(format!("upstream timeout #{i}"))))
                .collect(),
        )
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls(&self) -> Vec<RetryContext> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl RetryableOperation for ScriptedOperation {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn invoke(&self, ctx: &RetryContext) -> Result<(), OperationError> {
        self.calls.lock().push(ctx.clone());
        self.outcomes.lock().pop_front().unwrap_or(Ok(()))
    }
}

/// Probe returning a settable result
#[derive(Debug)]
pub struct ScriptedProbe {
    component: ComponentId,
    result: Mutex<Result<Option<String>, DependencyError>>,
}

impl ScriptedProbe {
    pub fn new(kind: ComponentKind, name: &str) -> Arc<Self> {
        Arc::new(Self {
            component: ComponentId::new(kind, name),
            result: Mutex::new(Ok(None)),
        })
    }

    pub fn set(&self, result: Result<Option<String>, DependencyError>) {
        *self.result.lock() = result;
    }

    pub fn fail(&self, message: &str) {
        self.set(Err(DependencyError::new(self.component.to_string(), message)));
    }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    fn component(&self) -> ComponentId {
        self.component.clone()
    }

    async fn check(&self) -> Result<Option<String>, DependencyError> {
        self.result.lock().clone()
    }
}

/// Event store whose writes and reads can be switched to fail
#[derive(Debug, Default)]
pub struct FlakyEventStore {
    inner: InMemoryEventStore,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    rejected: AtomicUsize,
}

impl FlakyEventStore {
    pub fn new(policy: OrderingPolicy) -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryEventStore::new(policy),
            ..Self::default()
        })
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn rejected(&self) -> usize {
        self.rejected.load(Ordering::SeqCst)
    }

    fn check(&self, flag: &AtomicBool) -> StoreResult<()> {
        if flag.load(Ordering::SeqCst) {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl EventStore for FlakyEventStore {
    async fn append(&self, event: NewProgressEvent) -> StoreResult<ProgressEvent> {
        self.check(&self.fail_writes)?;
        self.inner.append(event).await
    }

    async fn query_by_submission(&self, id: SubmissionId) -> StoreResult<Vec<ProgressEvent>> {
        self.check(&self.fail_reads)?;
        self.inner.query_by_submission(id).await
    }

    async fn query_range(&self, query: &EventQuery) -> StoreResult<Page<ProgressEvent>> {
        self.check(&self.fail_reads)?;
        self.inner.query_range(query).await
    }

    async fn ping(&self) -> StoreResult<u64> {
        self.check(&self.fail_reads)?;
        self.inner.ping().await
    }
}

/// Fully wired in-memory monitor on a manual clock
pub struct TestHarness {
    pub monitor: Arc<Monitor>,
    pub clock: Arc<ManualClock>,
    pub directory: Arc<InMemorySubmissionDirectory>,
    pub events: Arc<FlakyEventStore>,
    pub project: ProjectId,
    shutdown: (watch::Sender<bool>, watch::Receiver<bool>),
}

impl TestHarness {
    /// Builder with default configuration
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::default()
    }

    /// Harness with default configuration and no operations
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Register a submission created now on the default project
    pub fn submission(&self, pathway: &str) -> SubmissionId {
        self.submission_in(self.project, pathway)
    }

    /// Register a submission created now on a project
    pub fn submission_in(&self, project: ProjectId, pathway: &str) -> SubmissionId {
        let id = SubmissionId::new();
        self.directory.register(SubmissionRecord::new(
            id,
            project,
            Pathway::new(pathway),
            self.clock.now(),
        ));
        id
    }

    /// Record a transition at the current clock time
    pub async fn track(&self, id: SubmissionId, stage: Stage, status: ProgressStatus) -> ProgressEvent {
        self.monitor
            .tracker
            .track_progress(id, stage, status, None, None)
            .await
            .unwrap()
    }

    /// Record a failure with a reason
    pub async fn fail(&self, id: SubmissionId, stage: Stage, reason: &str) -> ProgressEvent {
        self.monitor
            .tracker
            .track_progress(id, stage, ProgressStatus::Failed, Some(reason.to_string()), None)
            .await
            .unwrap()
    }

    /// Current manual clock time
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Advance the manual clock
    pub fn advance_minutes(&self, minutes: i64) {
        self.clock.advance(Duration::minutes(minutes));
    }

    /// Shutdown receiver for driving retry cycles
    pub fn shutdown_signal(&self) -> &watch::Receiver<bool> {
        &self.shutdown.1
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`TestHarness`]
#[derive(Default)]
pub struct TestHarnessBuilder {
    config: MonitorConfig,
    registry: OperationRegistry,
    probes: Vec<Arc<dyn HealthProbe>>,
}

impl TestHarnessBuilder {
    pub fn config(mut self, config: MonitorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn operation(mut self, stage: Stage, operation: Arc<dyn RetryableOperation>) -> Self {
        self.registry.register(stage, operation);
        self
    }

    pub fn probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probes.push(probe);
        self
    }

    pub fn build(self) -> TestHarness {
        let clock = Arc::new(ManualClock::new(base_time()));
        let (mut stores, directory) = MonitorStores::in_memory(&self.config);
        let events = FlakyEventStore::new(self.config.store.ordering);
        let shared: Arc<dyn EventStore> = events.clone();
        stores.events = shared;
        let monitor = Monitor::new(self.config, stores, self.registry, self.probes, clock.clone());
        TestHarness {
            monitor: Arc::new(monitor),
            clock,
            directory,
            events,
            project: ProjectId::new(),
            shutdown: watch::channel(false),
        }
    }
}
