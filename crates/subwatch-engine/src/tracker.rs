//! Stage tracker
//!
//! The single write path for progress events. Each recorded event is
//! appended to the event store and then folded into the submission's
//! snapshot. Failed events feed the retry intake.
//!
//! ## Snapshot maintenance
//!
//! - Events newer than the snapshot are folded in with a compare-and-put on
//!   the snapshot's event count
//! - Late events (older than the snapshot) trigger a re-derivation from the
//!   full event sequence
//! - After repeated CAS conflicts the snapshot is rebuilt unconditionally

use crate::retry::RetryQueue;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use subwatch_core::{
    Clock, EventQuery, Metadata, MonitorError, MonitorResult, NewProgressEvent, Pagination,
    ProgressEvent, ProgressStatus, RetryKey, Stage, SubmissionId, SubmissionRecord,
    SubmissionSnapshot, SubmissionStatus,
};
use subwatch_store::{CasResult, EventStore, SnapshotStore, SubmissionDirectory};

const SNAPSHOT_CAS_ATTEMPTS: usize = 3;

/// Running tally of event recording failures
///
/// Fire-and-forget recording never surfaces errors to producers; the
/// event-store health probe reads this instead.
#[derive(Debug, Default)]
pub struct RecordingHealth {
    total_failures: AtomicU64,
    consecutive_failures: AtomicU64,
    last_failure: Mutex<Option<(DateTime<Utc>, String)>>,
}

impl RecordingHealth {
    /// Create with no failures recorded
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Note a successful write
    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    /// Note a failed write
    pub fn record_failure(&self, at: DateTime<Utc>, reason: impl Into<String>) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        *self.last_failure.lock() = Some((at, reason.into()));
    }

    /// Failures since the last successful write
    #[inline]
    #[must_use]
    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Failures since start
    #[inline]
    #[must_use]
    pub fn total_failures(&self) -> u64 {
        self.total_failures.load(Ordering::Relaxed)
    }

    /// Most recent failure
    #[must_use]
    pub fn last_failure(&self) -> Option<(DateTime<Utc>, String)> {
        self.last_failure.lock().clone()
    }
}

/// One event in a human-readable timeline
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    pub stage: Stage,
    pub stage_label: &'static str,
    pub status: ProgressStatus,
    pub status_label: &'static str,
    pub detail: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl From<&ProgressEvent> for TimelineEntry {
    fn from(event: &ProgressEvent) -> Self {
        Self {
            stage: event.stage,
            stage_label: event.stage.label(),
            status: event.status,
            status_label: event.status.label(),
            detail: event.detail.clone(),
            occurred_at: event.occurred_at,
        }
    }
}

/// Current status plus timeline, as served to the public status page
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub submission_id: SubmissionId,
    pub status: SubmissionStatus,
    pub latest_stage: Option<Stage>,
    pub latest_stage_status: Option<ProgressStatus>,
    pub last_event_at: Option<DateTime<Utc>>,
    pub timeline: Vec<TimelineEntry>,
}

/// Records progress events and maintains submission snapshots
pub struct StageTracker {
    events: Arc<dyn EventStore>,
    snapshots: Arc<dyn SnapshotStore>,
    directory: Arc<dyn SubmissionDirectory>,
    clock: Arc<dyn Clock>,
    intake: Option<Arc<RetryQueue>>,
    health: Arc<RecordingHealth>,
}

impl std::fmt::Debug for StageTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageTracker")
            .field("retry_intake", &self.intake.is_some())
            .field("recording_failures", &self.health.total_failures())
            .finish_non_exhaustive()
    }
}

impl StageTracker {
    /// Create tracker over the given stores
    #[must_use]
    pub fn new(
        events: Arc<dyn EventStore>,
        snapshots: Arc<dyn SnapshotStore>,
        directory: Arc<dyn SubmissionDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            events,
            snapshots,
            directory,
            clock,
            intake: None,
            health: Arc::new(RecordingHealth::new()),
        }
    }

    /// Feed failed events into a retry queue
    #[must_use]
    pub fn with_retry_intake(mut self, intake: Arc<RetryQueue>) -> Self {
        self.intake = Some(intake);
        self
    }

    /// Share a recording health tally
    #[must_use]
    pub fn with_recording_health(mut self, health: Arc<RecordingHealth>) -> Self {
        self.health = health;
        self
    }

    /// Recording health tally read by the event-store probe
    #[inline]
    #[must_use]
    pub fn recording_health(&self) -> &Arc<RecordingHealth> {
        &self.health
    }

    /// Record a stage transition at the current time
    ///
    /// # Errors
    /// - `MonitorError::NotFound` if the submission table does not know the id
    /// - `MonitorError::Store` if the event could not be persisted
    pub async fn track_progress(
        &self,
        submission_id: SubmissionId,
        stage: Stage,
        status: ProgressStatus,
        detail: Option<String>,
        metadata: Option<Metadata>,
    ) -> MonitorResult<ProgressEvent> {
        let mut event = NewProgressEvent::new(submission_id, stage, status, self.clock.now());
        event.detail = detail;
        event.metadata = metadata;
        self.track_event(event).await
    }

    /// Record an event carrying a producer-supplied timestamp
    ///
    /// # Errors
    /// See [`StageTracker::track_progress`]
    pub async fn track_event(&self, mut event: NewProgressEvent) -> MonitorResult<ProgressEvent> {
        let record = self.lookup(event.submission_id).await?;
        event.project_id = Some(record.project_id);

        let stored = self.events.append(event).await?;
        tracing::debug!(
            "Recorded {} {} for {} (seq {})",
            stored.stage,
            stored.status,
            stored.submission_id,
            stored.sequence
        );

        self.refresh_snapshot(&record, &stored).await?;

        if stored.status == ProgressStatus::Failed && !stored.is_retry_outcome() {
            self.enqueue_retry(&stored).await;
        }

        Ok(stored)
    }

    /// Record without failing the caller
    ///
    /// Errors are logged and counted in [`RecordingHealth`].
    pub async fn record(&self, event: NewProgressEvent) -> Option<ProgressEvent> {
        let submission_id = event.submission_id;
        match self.track_event(event).await {
            Ok(stored) => {
                self.health.record_success();
                Some(stored)
            }
            Err(e) => {
                tracing::warn!("Failed to record progress for {}: {}", submission_id, e);
                self.health.record_failure(self.clock.now(), e.to_string());
                None
            }
        }
    }

    /// Ordered events with readable labels
    ///
    /// # Errors
    /// `MonitorError::NotFound` for an unknown submission
    pub async fn get_timeline(&self, submission_id: SubmissionId) -> MonitorResult<Vec<TimelineEntry>> {
        self.lookup(submission_id).await?;
        let events = self.events.query_by_submission(submission_id).await?;
        Ok(events.iter().map(TimelineEntry::from).collect())
    }

    /// Current status and timeline
    ///
    /// Falls back to deriving from events when no snapshot is cached yet.
    ///
    /// # Errors
    /// `MonitorError::NotFound` for an unknown submission
    pub async fn get_status(&self, submission_id: SubmissionId) -> MonitorResult<StatusView> {
        let record = self.lookup(submission_id).await?;
        let events = self.events.query_by_submission(submission_id).await?;
        let snapshot = match self.snapshots.get(submission_id).await? {
            Some(snapshot) => Some(snapshot),
            None => SubmissionSnapshot::derive(&record, &events),
        };

        Ok(StatusView {
            submission_id,
            status: snapshot.as_ref().map_or(SubmissionStatus::Pending, |s| s.status),
            latest_stage: snapshot.as_ref().map(|s| s.latest_stage),
            latest_stage_status: snapshot.as_ref().map(|s| s.latest_stage_status),
            last_event_at: snapshot.as_ref().map(|s| s.last_event_at),
            timeline: events.iter().map(TimelineEntry::from).collect(),
        })
    }

    /// Re-derive one snapshot from its full event sequence
    ///
    /// # Errors
    /// `MonitorError::NotFound` for an unknown submission
    pub async fn rebuild_snapshot(
        &self,
        submission_id: SubmissionId,
    ) -> MonitorResult<Option<SubmissionSnapshot>> {
        let record = self.lookup(submission_id).await?;
        self.rederive(&record).await
    }

    /// Re-derive every snapshot that has events
    ///
    /// Submissions unknown to the directory are skipped. Returns the number of
    /// snapshots written.
    ///
    /// # Errors
    /// Store failures
    pub async fn rebuild_all(&self) -> MonitorResult<usize> {
        let all = EventQuery {
            page: Pagination::unbounded(),
            ..EventQuery::default()
        };
        let ids: BTreeSet<SubmissionId> = self
            .events
            .query_range(&all)
            .await?
            .items
            .into_iter()
            .map(|e| e.submission_id)
            .collect();

        let mut rebuilt = 0;
        for id in ids {
            match self.directory.lookup(id).await? {
                Some(record) => {
                    if self.rederive(&record).await?.is_some() {
                        rebuilt += 1;
                    }
                }
                None => tracing::warn!("Skipping snapshot rebuild for unknown submission {}", id),
            }
        }
        tracing::info!("Rebuilt {} submission snapshots", rebuilt);
        Ok(rebuilt)
    }

    async fn lookup(&self, submission_id: SubmissionId) -> MonitorResult<SubmissionRecord> {
        self.directory
            .lookup(submission_id)
            .await?
            .ok_or_else(|| MonitorError::not_found("submission", submission_id))
    }

    async fn rederive(&self, record: &SubmissionRecord) -> MonitorResult<Option<SubmissionSnapshot>> {
        let events = self.events.query_by_submission(record.submission_id).await?;
        let snapshot = SubmissionSnapshot::derive(record, &events);
        if let Some(snapshot) = &snapshot {
            self.snapshots.put(snapshot.clone()).await?;
        }
        Ok(snapshot)
    }

    async fn refresh_snapshot(
        &self,
        record: &SubmissionRecord,
        event: &ProgressEvent,
    ) -> MonitorResult<()> {
        for _ in 0..SNAPSHOT_CAS_ATTEMPTS {
            let current = self.snapshots.get(record.submission_id).await?;
            let expected = current.as_ref().map(|s| s.event_count);

            let next = match current {
                Some(mut snapshot) if snapshot.is_newer(event) => {
                    snapshot.apply(event);
                    snapshot
                }
                // first event, or a late event behind the snapshot
                _ => {
                    let events = self.events.query_by_submission(record.submission_id).await?;
                    match SubmissionSnapshot::derive(record, &events) {
                        Some(snapshot) => snapshot,
                        None => return Ok(()),
                    }
                }
            };

            match self.snapshots.compare_and_put(next, expected).await? {
                CasResult::Success(_) => return Ok(()),
                CasResult::NotFound | CasResult::Conflict { .. } => {
                    tracing::debug!("Snapshot race on {}, retrying", record.submission_id);
                }
            }
        }

        self.rederive(record).await?;
        Ok(())
    }

    async fn enqueue_retry(&self, event: &ProgressEvent) {
        let Some(intake) = &self.intake else {
            return;
        };
        let key = RetryKey::new(event.submission_id, event.stage);
        if let Err(e) = intake.enqueue(key, event.detail.clone()).await {
            tracing::warn!("Failed to enqueue retry for {}: {}", key, e);
        }
    }
}
