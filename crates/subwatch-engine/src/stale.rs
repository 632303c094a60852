//! Stale submission detection
//!
//! A read-only sweep over active snapshots. A submission is stale when its
//! last event is older than the inactivity threshold of its current stage.
//! The sweep never touches event data; it may only create retry tasks.

use crate::retry::RetryQueue;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Reverse;
use std::sync::Arc;
use subwatch_core::{
    Clock, MonitorResult, ProgressStatus, ProjectId, RetryKey, Stage, StaleConfig, SnapshotQuery,
    SubmissionId, SubmissionSnapshot, SubmissionStatus,
};
use subwatch_store::SnapshotStore;

/// A submission inactive past its stage threshold
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaleCandidate {
    pub submission_id: SubmissionId,
    pub project_id: ProjectId,
    pub status: SubmissionStatus,
    pub latest_stage: Stage,
    pub latest_stage_status: ProgressStatus,
    pub last_event_at: DateTime<Utc>,
    pub minutes_inactive: i64,
    pub threshold_minutes: u64,
}

impl StaleCandidate {
    fn from_snapshot(snapshot: &SubmissionSnapshot, minutes_inactive: i64, threshold: u64) -> Self {
        Self {
            submission_id: snapshot.submission_id,
            project_id: snapshot.project_id,
            status: snapshot.status,
            latest_stage: snapshot.latest_stage,
            latest_stage_status: snapshot.latest_stage_status,
            last_event_at: snapshot.last_event_at,
            minutes_inactive,
            threshold_minutes: threshold,
        }
    }
}

/// Result of a sweep that may feed the retry queue
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub candidates: Vec<StaleCandidate>,
    /// Retry tasks newly created from candidates
    pub enqueued: usize,
}

/// Periodic stale sweep
pub struct StaleDetector {
    snapshots: Arc<dyn SnapshotStore>,
    config: StaleConfig,
    clock: Arc<dyn Clock>,
    intake: Option<Arc<RetryQueue>>,
}

impl std::fmt::Debug for StaleDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaleDetector")
            .field("config", &self.config)
            .field("retry_intake", &self.intake.is_some())
            .finish_non_exhaustive()
    }
}

impl StaleDetector {
    /// Create detector
    #[must_use]
    pub fn new(snapshots: Arc<dyn SnapshotStore>, config: StaleConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            snapshots,
            config,
            clock,
            intake: None,
        }
    }

    /// Feed candidates with retryable stages into a retry queue
    #[must_use]
    pub fn with_retry_intake(mut self, intake: Arc<RetryQueue>) -> Self {
        self.intake = Some(intake);
        self
    }

    /// Stale candidates at the current time, longest inactive first
    ///
    /// # Errors
    /// Store failures
    pub async fn sweep(&self, project_id: Option<ProjectId>) -> MonitorResult<Vec<StaleCandidate>> {
        self.sweep_at(self.clock.now(), project_id).await
    }

    /// Stale candidates as of `now`
    ///
    /// # Errors
    /// Store failures
    pub async fn sweep_at(
        &self,
        now: DateTime<Utc>,
        project_id: Option<ProjectId>,
    ) -> MonitorResult<Vec<StaleCandidate>> {
        let snapshots = self
            .snapshots
            .list(&SnapshotQuery::all().for_project(project_id))
            .await?
            .items;

        let mut candidates: Vec<StaleCandidate> = snapshots
            .iter()
            .filter(|s| s.status.is_active())
            .filter_map(|s| {
                let threshold = self.config.thresholds.minutes_for(s.latest_stage);
                let inactive = s.minutes_inactive(now);
                let exceeded = u64::try_from(inactive).map_or(false, |m| m > threshold);
                exceeded.then(|| StaleCandidate::from_snapshot(s, inactive, threshold))
            })
            .collect();
        candidates.sort_by_key(|c| (Reverse(c.minutes_inactive), c.submission_id));

        tracing::debug!(
            "Stale sweep found {} of {} submissions",
            candidates.len(),
            snapshots.len()
        );
        Ok(candidates)
    }

    /// Sweep and, if configured, enqueue retries for the candidates
    ///
    /// Candidates whose latest stage completed are reported but never queued.
    ///
    /// # Errors
    /// Store failures
    pub async fn run_once(&self) -> MonitorResult<SweepReport> {
        let candidates = self.sweep(None).await?;
        let mut enqueued = 0;

        if let (true, Some(intake)) = (self.config.enqueue_retries, &self.intake) {
            // a completed stage is idle, not broken; only unfinished stages are retried
            let unfinished = candidates
                .iter()
                .filter(|c| c.latest_stage_status != ProgressStatus::Completed);
            for candidate in unfinished {
                let key = RetryKey::new(candidate.submission_id, candidate.latest_stage);
                let reason = format!(
                    "stale for {} minutes (threshold {})",
                    candidate.minutes_inactive, candidate.threshold_minutes
                );
                let created = intake
                    .enqueue(key, Some(reason))
                    .await?
                    .is_some_and(|outcome| outcome.is_inserted());
                if created {
                    enqueued += 1;
                }
            }
        }

        if !candidates.is_empty() {
            tracing::info!(
                "Stale sweep: {} candidates, {} retries queued",
                candidates.len(),
                enqueued
            );
        }
        Ok(SweepReport {
            candidates,
            enqueued,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::{OperationRegistry, RetryContext, RetryableOperation};
    use async_trait::async_trait;
    use chrono::Duration;
    use subwatch_core::{ManualClock, OperationError, Pathway, StageThresholds};
    use subwatch_store::{InMemoryRetryTaskStore, InMemorySnapshotStore, RetryTaskStore};

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-06-10T15:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn snapshot(stage: Stage, status: SubmissionStatus, minutes_ago: i64) -> SubmissionSnapshot {
        snapshot_with(stage, ProgressStatus::InProgress, status, minutes_ago)
    }

    fn snapshot_with(
        stage: Stage,
        stage_status: ProgressStatus,
        status: SubmissionStatus,
        minutes_ago: i64,
    ) -> SubmissionSnapshot {
        let at = now() - Duration::minutes(minutes_ago);
        SubmissionSnapshot {
            submission_id: SubmissionId::new(),
            project_id: ProjectId::new(),
            pathway: Pathway::new("direct_review"),
            status,
            latest_stage: stage,
            latest_stage_status: stage_status,
            last_event_at: at,
            last_sequence: 1,
            created_at: at,
            completed_at: None,
            event_count: 1,
        }
    }

    fn config() -> StaleConfig {
        StaleConfig {
            thresholds: StageThresholds::default().with(Stage::DocumentGeneration, 120),
            ..StaleConfig::default()
        }
    }

    async fn store_with(snapshots: &[SubmissionSnapshot]) -> Arc<InMemorySnapshotStore> {
        let store = Arc::new(InMemorySnapshotStore::new());
        for s in snapshots {
            store.put(s.clone()).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn flags_only_submissions_past_threshold() {
        let stale = snapshot(Stage::DocumentGeneration, SubmissionStatus::InProgress, 200);
        let fresh = snapshot(Stage::DocumentGeneration, SubmissionStatus::InProgress, 30);
        let done = snapshot(Stage::CouncilDelivery, SubmissionStatus::Completed, 900);
        let failed = snapshot(Stage::Review, SubmissionStatus::Failed, 900);
        let store = store_with(&[stale.clone(), fresh, done, failed]).await;

        let detector = StaleDetector::new(store, config(), Arc::new(ManualClock::new(now())));
        let candidates = detector.sweep(None).await.unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].submission_id, stale.submission_id);
        assert_eq!(candidates[0].minutes_inactive, 200);
        assert_eq!(candidates[0].threshold_minutes, 120);
    }

    #[tokio::test]
    async fn later_stages_use_shorter_thresholds() {
        let delivery = snapshot(Stage::CouncilDelivery, SubmissionStatus::InProgress, 45);
        let generation = snapshot(Stage::DocumentGeneration, SubmissionStatus::Pending, 45);
        let store = store_with(&[delivery.clone(), generation]).await;

        let detector = StaleDetector::new(store, config(), Arc::new(ManualClock::new(now())));
        let ids: Vec<_> = detector
            .sweep(None)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.submission_id)
            .collect();
        assert_eq!(ids, vec![delivery.submission_id]);
    }

    #[tokio::test]
    async fn sweep_filters_by_project() {
        let a = snapshot(Stage::Review, SubmissionStatus::InProgress, 500);
        let b = snapshot(Stage::Review, SubmissionStatus::InProgress, 500);
        let store = store_with(&[a.clone(), b]).await;
        let detector = StaleDetector::new(store, config(), Arc::new(ManualClock::new(now())));
        let candidates = detector.sweep(Some(a.project_id)).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].project_id, a.project_id);
    }

    #[derive(Debug)]
    struct Noop;

    #[async_trait]
    impl RetryableOperation for Noop {
        fn name(&self) -> &str {
            "noop"
        }

        async fn invoke(&self, _ctx: &RetryContext) -> Result<(), OperationError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn run_once_enqueues_registered_stages_once() {
        let generation = snapshot(Stage::DocumentGeneration, SubmissionStatus::InProgress, 300);
        let review = snapshot(Stage::Review, SubmissionStatus::InProgress, 300);
        let store = store_with(&[generation.clone(), review]).await;
        let clock = Arc::new(ManualClock::new(now()));
        let tasks = Arc::new(InMemoryRetryTaskStore::new());
        let registry = OperationRegistry::new().with(Stage::DocumentGeneration, Arc::new(Noop));
        let queue = Arc::new(RetryQueue::new(tasks.clone(), Arc::new(registry), clock.clone()));

        let detector = StaleDetector::new(store, config(), clock).with_retry_intake(queue);
        let report = detector.run_once().await.unwrap();
        assert_eq!(report.candidates.len(), 2);
        assert_eq!(report.enqueued, 1);

        let again = detector.run_once().await.unwrap();
        assert_eq!(again.enqueued, 0);
        let task = tasks
            .get(RetryKey::new(generation.submission_id, Stage::DocumentGeneration))
            .await
            .unwrap()
            .unwrap();
        assert!(task.last_error.unwrap().starts_with("stale for 300 minutes"));
    }

    #[tokio::test]
    async fn completed_stage_is_reported_but_not_retried() {
        let idle = snapshot_with(
            Stage::DocumentGeneration,
            ProgressStatus::Completed,
            SubmissionStatus::InProgress,
            200,
        );
        let stuck = snapshot(Stage::DocumentGeneration, SubmissionStatus::InProgress, 200);
        let store = store_with(&[idle.clone(), stuck.clone()]).await;
        let clock = Arc::new(ManualClock::new(now()));
        let tasks = Arc::new(InMemoryRetryTaskStore::new());
        let registry = OperationRegistry::new().with(Stage::DocumentGeneration, Arc::new(Noop));
        let queue = Arc::new(RetryQueue::new(tasks.clone(), Arc::new(registry), clock.clone()));

        let detector = StaleDetector::new(store, config(), clock).with_retry_intake(queue);
        let report = detector.run_once().await.unwrap();

        assert_eq!(report.candidates.len(), 2);
        assert!(report
            .candidates
            .iter()
            .any(|c| c.submission_id == idle.submission_id));
        assert_eq!(report.enqueued, 1);
        assert!(tasks
            .get(RetryKey::new(stuck.submission_id, Stage::DocumentGeneration))
            .await
            .unwrap()
            .is_some());
        assert!(tasks
            .get(RetryKey::new(idle.submission_id, Stage::DocumentGeneration))
            .await
            .unwrap()
            .is_none());
    }
}
