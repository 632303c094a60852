//! Retry orchestration
//!
//! Recovery of failed stages is explicit state: every `(submission, stage)`
//! under recovery has one durable [`RetryTask`]. The orchestrator claims due
//! tasks with a conditional update, invokes the stage's registered operation
//! and records the outcome as a progress event.
//!
//! ## Guarantees
//!
//! - **Single-flight**: a task is only invoked by the orchestrator whose claim
//!   succeeded; concurrent claims on the same version conflict
//! - **At-least-once**: a crashed or aborted claim is returned to `queued`, so
//!   operations must be idempotent per `(submission, stage)`
//! - **Bounded**: after `max_attempts` failures, or one permanent failure, the
//!   task is `exhausted` and waits for a manual requeue

use crate::tracker::StageTracker;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use subwatch_core::event::{META_ATTEMPT, META_RETRY};
use subwatch_core::{
    Clock, Metadata, MonitorError, MonitorResult, NewProgressEvent, OperationError, Page,
    Pagination, ProgressEvent, ProgressStatus, RetryConfig, RetryKey, RetryStatus, RetryTask,
    Stage, SubmissionId, SubmissionSnapshot,
};
use subwatch_store::{CasResult, EventStore, InsertOutcome, RetryTaskStore, SnapshotStore};
use tokio::sync::watch;

/// What a retried operation gets to work with
#[derive(Debug, Clone, PartialEq)]
pub struct RetryContext {
    pub submission_id: SubmissionId,
    pub stage: Stage,
    /// 1-based attempt number of this invocation
    pub attempt: u32,
    pub snapshot: Option<SubmissionSnapshot>,
    /// Latest `completed` event of the submission, if any
    pub last_good_event: Option<ProgressEvent>,
}

/// Re-invocable stage operation supplied by a pipeline collaborator
///
/// Implementations must be idempotent for a given `(submission, stage)`.
#[async_trait]
pub trait RetryableOperation: Send + Sync + Debug {
    /// Operation name for logs
    fn name(&self) -> &str;

    /// Run the operation once.
    ///
    /// # Errors
    /// `OperationError::Transient` to retry after backoff,
    /// `OperationError::Permanent` to stop retrying.
    async fn invoke(&self, ctx: &RetryContext) -> Result<(), OperationError>;
}

/// Registry of retryable operations, one per stage
#[derive(Debug, Default, Clone)]
pub struct OperationRegistry {
    operations: HashMap<Stage, Arc<dyn RetryableOperation>>,
}

impl OperationRegistry {
    /// Create new empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the operation for a stage, replacing any previous one
    pub fn register(&mut self, stage: Stage, operation: Arc<dyn RetryableOperation>) {
        self.operations.insert(stage, operation);
    }

    /// With an operation registered
    #[must_use]
    pub fn with(mut self, stage: Stage, operation: Arc<dyn RetryableOperation>) -> Self {
        self.register(stage, operation);
        self
    }

    /// Operation for a stage
    #[inline]
    #[must_use]
    pub fn get(&self, stage: Stage) -> Option<&Arc<dyn RetryableOperation>> {
        self.operations.get(&stage)
    }

    /// Check if a stage is retryable
    #[inline]
    #[must_use]
    pub fn contains(&self, stage: Stage) -> bool {
        self.operations.contains_key(&stage)
    }

    /// Registered stages in pipeline order
    #[must_use]
    pub fn stages(&self) -> Vec<Stage> {
        Stage::ALL.into_iter().filter(|s| self.contains(*s)).collect()
    }

    /// Get number of registered operations
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Check if registry is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Intake and admin view of retry tasks
///
/// Shared by the tracker (failed events), the stale detector (stale
/// candidates) and the orchestrator.
pub struct RetryQueue {
    tasks: Arc<dyn RetryTaskStore>,
    registry: Arc<OperationRegistry>,
    clock: Arc<dyn Clock>,
}

impl Debug for RetryQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryQueue")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl RetryQueue {
    /// Create queue over a task store
    #[must_use]
    pub fn new(
        tasks: Arc<dyn RetryTaskStore>,
        registry: Arc<OperationRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tasks,
            registry,
            clock,
        }
    }

    /// Operation registry
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    /// Task store
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<dyn RetryTaskStore> {
        &self.tasks
    }

    /// Create a queued task unless one is active or exhausted for the key
    ///
    /// Returns `None` when the stage has no registered operation.
    ///
    /// # Errors
    /// Store failures
    pub async fn enqueue(
        &self,
        key: RetryKey,
        reason: Option<String>,
    ) -> MonitorResult<Option<InsertOutcome>> {
        if !self.registry.contains(key.stage) {
            tracing::debug!("No retryable operation for {}, not enqueuing {}", key.stage, key);
            return Ok(None);
        }
        let outcome = self
            .tasks
            .insert_if_absent(RetryTask::queued(key, reason, self.clock.now()))
            .await?;
        match &outcome {
            InsertOutcome::Inserted(_) => tracing::info!("Queued retry for {}", key),
            InsertOutcome::ActiveExists(task) => {
                tracing::debug!("Retry for {} already {}", key, task.status);
            }
            InsertOutcome::Exhausted(_) => {
                tracing::debug!("Retry for {} is exhausted, awaiting manual requeue", key);
            }
        }
        Ok(Some(outcome))
    }

    /// Reset an exhausted task to queued with a fresh attempt budget
    ///
    /// # Errors
    /// - `MonitorError::NotFound` if no task exists for the key
    /// - `MonitorError::Validation` if the task is not exhausted or changed
    ///   concurrently
    pub async fn requeue(&self, key: RetryKey) -> MonitorResult<RetryTask> {
        let mut task = self
            .tasks
            .get(key)
            .await?
            .ok_or_else(|| MonitorError::not_found("retry task", key))?;
        if task.status != RetryStatus::Exhausted {
            return Err(MonitorError::validation(format!(
                "retry task {key} is {}, only exhausted tasks can be requeued",
                task.status
            )));
        }

        let now = self.clock.now();
        task.status = RetryStatus::Queued;
        task.attempt_count = 0;
        task.next_eligible_at = now;
        task.lease_expires_at = None;
        task.updated_at = now;

        match self.tasks.update(task).await? {
            CasResult::Success(task) => {
                tracing::info!("Manually requeued retry for {}", key);
                Ok(task)
            }
            CasResult::NotFound => Err(MonitorError::not_found("retry task", key)),
            CasResult::Conflict { .. } => Err(MonitorError::validation(format!(
                "retry task {key} changed concurrently"
            ))),
        }
    }

    /// Tasks by status, most recently updated first
    ///
    /// # Errors
    /// Store failures
    pub async fn list(
        &self,
        status: Option<RetryStatus>,
        page: Pagination,
    ) -> MonitorResult<Page<RetryTask>> {
        Ok(self.tasks.list(status, page).await?)
    }
}

/// Counters for one orchestrator cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    /// Expired leases returned to the queue
    pub reclaimed: usize,
    /// Tasks claimed and invoked
    pub attempted: usize,
    pub succeeded: usize,
    /// Failed and scheduled for another attempt
    pub rescheduled: usize,
    pub exhausted: usize,
    /// Claims released because of shutdown
    pub released: usize,
}

enum Attempt {
    Finished(Result<(), OperationError>),
    Aborted,
}

/// Drives queued retry tasks through their operations
pub struct RetryOrchestrator {
    queue: Arc<RetryQueue>,
    tracker: Arc<StageTracker>,
    events: Arc<dyn EventStore>,
    snapshots: Arc<dyn SnapshotStore>,
    config: RetryConfig,
    clock: Arc<dyn Clock>,
}

impl Debug for RetryOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryOrchestrator")
            .field("config", &self.config)
            .field("operations", &self.queue.registry().stages())
            .finish_non_exhaustive()
    }
}

impl RetryOrchestrator {
    /// Create orchestrator
    #[must_use]
    pub fn new(
        queue: Arc<RetryQueue>,
        tracker: Arc<StageTracker>,
        events: Arc<dyn EventStore>,
        snapshots: Arc<dyn SnapshotStore>,
        config: RetryConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            queue,
            tracker,
            events,
            snapshots,
            config,
            clock,
        }
    }

    /// Retry queue shared with the intake paths
    #[inline]
    #[must_use]
    pub fn queue(&self) -> &Arc<RetryQueue> {
        &self.queue
    }

    /// Run one cycle: reclaim expired leases, then claim and invoke due tasks
    ///
    /// Stops claiming once `shutdown` reads `true`; an operation interrupted
    /// by shutdown has its claim released without consuming an attempt.
    ///
    /// # Errors
    /// Store failures while listing tasks
    pub async fn run_once(&self, shutdown: &watch::Receiver<bool>) -> MonitorResult<CycleReport> {
        let mut report = CycleReport {
            reclaimed: self.reclaim_expired().await?,
            ..CycleReport::default()
        };

        let now = self.clock.now();
        let due = self.queue.store().due(now, self.config.batch_size).await?;
        for task in due {
            if *shutdown.borrow() {
                break;
            }
            let lease_until = now + to_chrono(Duration::from_secs(self.config.lease_secs));
            let claimed = match self
                .queue
                .store()
                .claim(task.key, task.version, now, lease_until)
                .await?
            {
                CasResult::Success(claimed) => claimed,
                CasResult::NotFound | CasResult::Conflict { .. } => {
                    tracing::debug!("Lost claim on {}", task.key);
                    continue;
                }
            };

            report.attempted += 1;
            self.attempt(claimed, shutdown.clone(), &mut report).await?;
        }

        if report.attempted > 0 || report.reclaimed > 0 {
            tracing::info!(
                "Retry cycle: {} attempted, {} succeeded, {} rescheduled, {} exhausted",
                report.attempted,
                report.succeeded,
                report.rescheduled,
                report.exhausted
            );
        }
        Ok(report)
    }

    async fn reclaim_expired(&self) -> MonitorResult<usize> {
        let now = self.clock.now();
        let mut reclaimed = 0;
        for mut task in self.queue.store().expired_leases(now).await? {
            let key = task.key;
            task.status = RetryStatus::Queued;
            task.lease_expires_at = None;
            task.next_eligible_at = now;
            task.updated_at = now;
            if self.queue.store().update(task).await?.is_success() {
                tracing::warn!("Reclaimed expired lease on {}", key);
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }

    async fn attempt(
        &self,
        mut task: RetryTask,
        mut shutdown: watch::Receiver<bool>,
        report: &mut CycleReport,
    ) -> MonitorResult<()> {
        let key = task.key;
        let attempt = task.attempt_count + 1;

        let outcome = match self.queue.registry().get(key.stage) {
            Some(operation) => {
                let ctx = self.context(key, attempt).await?;
                let timeout = Duration::from_secs(self.config.operation_timeout_secs);
                tracing::debug!("Invoking {} for {} (attempt {})", operation.name(), key, attempt);
                tokio::select! {
                    result = tokio::time::timeout(timeout, operation.invoke(&ctx)) => {
                        Attempt::Finished(result.unwrap_or_else(|_| {
                            Err(OperationError::Transient(format!(
                                "timed out after {}s",
                                timeout.as_secs()
                            )))
                        }))
                    }
                    () = wait_for_shutdown(&mut shutdown) => Attempt::Aborted,
                }
            }
            None => Attempt::Finished(Err(OperationError::Permanent(format!(
                "no retryable operation registered for {}",
                key.stage
            )))),
        };

        let now = self.clock.now();
        task.lease_expires_at = None;
        task.last_attempt_at = Some(now);
        task.updated_at = now;

        match outcome {
            Attempt::Aborted => {
                task.status = RetryStatus::Queued;
                report.released += 1;
                tracing::info!("Released claim on {} for shutdown", key);
            }
            Attempt::Finished(Ok(())) => {
                task.attempt_count = attempt;
                task.status = RetryStatus::Succeeded;
                task.last_error = None;
                report.succeeded += 1;
                tracing::info!("Retry of {} succeeded on attempt {}", key, attempt);
                self.record(key, ProgressStatus::Completed, attempt, None, now).await;
            }
            Attempt::Finished(Err(err)) => {
                task.attempt_count = attempt;
                task.last_error = Some(err.reason().to_string());
                if !err.is_retryable() || attempt >= self.config.max_attempts {
                    task.status = RetryStatus::Exhausted;
                    report.exhausted += 1;
                    tracing::warn!(
                        "Retry of {} exhausted after {} attempts: {}",
                        key,
                        attempt,
                        err
                    );
                } else {
                    let delay = self.config.backoff(attempt);
                    task.status = RetryStatus::Queued;
                    task.next_eligible_at = now + to_chrono(delay);
                    report.rescheduled += 1;
                    tracing::debug!(
                        "Retry of {} failed ({}), next attempt in {}s",
                        key,
                        err,
                        delay.as_secs()
                    );
                }
                self.record(key, ProgressStatus::Failed, attempt, Some(err.reason().to_string()), now)
                    .await;
            }
        }

        if !self.queue.store().update(task).await?.is_success() {
            tracing::warn!("Retry task {} changed while in flight", key);
        }
        Ok(())
    }

    async fn context(&self, key: RetryKey, attempt: u32) -> MonitorResult<RetryContext> {
        let snapshot = self.snapshots.get(key.submission_id).await?;
        let events = self.events.query_by_submission(key.submission_id).await?;
        let last_good_event = events
            .into_iter()
            .rev()
            .find(|e| e.status == ProgressStatus::Completed);
        Ok(RetryContext {
            submission_id: key.submission_id,
            stage: key.stage,
            attempt,
            snapshot,
            last_good_event,
        })
    }

    async fn record(
        &self,
        key: RetryKey,
        status: ProgressStatus,
        attempt: u32,
        detail: Option<String>,
        at: DateTime<Utc>,
    ) {
        let mut metadata = Metadata::new();
        metadata.insert(META_RETRY.into(), true.into());
        metadata.insert(META_ATTEMPT.into(), attempt.into());
        let mut event = NewProgressEvent::new(key.submission_id, key.stage, status, at)
            .with_metadata(metadata);
        event.detail = detail;
        self.tracker.record(event).await;
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            // sender gone: nobody can ask us to stop any more
            std::future::pending::<()>().await;
        }
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::weeks(52))
}
