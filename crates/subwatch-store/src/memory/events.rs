use crate::{EventStore, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use subwatch_core::{
    EventQuery, NewProgressEvent, OrderingPolicy, Page, ProgressEvent, StoreError, SubmissionId,
};

#[derive(Debug, Default)]
struct EventLog {
    events: Vec<ProgressEvent>,
    by_submission: HashMap<SubmissionId, Vec<usize>>,
    latest: HashMap<SubmissionId, DateTime<Utc>>,
    next_sequence: u64,
}

/// Append-only event ledger held in memory
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    policy: OrderingPolicy,
    inner: RwLock<EventLog>,
}

impl InMemoryEventStore {
    /// Create store with the given out-of-order policy
    #[must_use]
    pub fn new(policy: OrderingPolicy) -> Self {
        Self {
            policy,
            inner: RwLock::new(EventLog::default()),
        }
    }

    /// Number of stored events
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().events.len()
    }

    /// Whether no event was ever appended
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, event: NewProgressEvent) -> StoreResult<ProgressEvent> {
        let mut log = self.inner.write();

        if let Some(latest) = log.latest.get(&event.submission_id).copied() {
            if event.occurred_at < latest {
                if self.policy == OrderingPolicy::Reject {
                    return Err(StoreError::Conflict {
                        submission_id: event.submission_id,
                        occurred_at: event.occurred_at,
                        latest,
                    });
                }
                tracing::debug!(
                    "Accepting out-of-order event for {}: {} < {}",
                    event.submission_id,
                    event.occurred_at,
                    latest
                );
            }
        }

        log.next_sequence += 1;
        let stored = ProgressEvent::from_new(event, log.next_sequence);
        let index = log.events.len();
        let submission_id = stored.submission_id;
        let occurred_at = stored.occurred_at;

        log.events.push(stored.clone());
        log.by_submission.entry(submission_id).or_default().push(index);
        log.latest
            .entry(submission_id)
            .and_modify(|latest| *latest = (*latest).max(occurred_at))
            .or_insert(occurred_at);

        Ok(stored)
    }

    async fn query_by_submission(&self, id: SubmissionId) -> StoreResult<Vec<ProgressEvent>> {
        let log = self.inner.read();
        let mut events: Vec<ProgressEvent> = log
            .by_submission
            .get(&id)
            .map(|indices| indices.iter().map(|&i| log.events[i].clone()).collect())
            .unwrap_or_default();
        events.sort_by(ProgressEvent::timeline_cmp);
        Ok(events)
    }

    async fn query_range(&self, query: &EventQuery) -> StoreResult<Page<ProgressEvent>> {
        let mut matching: Vec<ProgressEvent> = {
            let log = self.inner.read();
            log.events
                .iter()
                .filter(|e| query.stage.map_or(true, |s| e.stage == s))
                .filter(|e| query.status.map_or(true, |s| e.status == s))
                .filter(|e| query.project_id.map_or(true, |p| e.project_id == Some(p)))
                .filter(|e| query.range.contains(e.occurred_at))
                .cloned()
                .collect()
        };
        matching.sort_by(|a, b| b.timeline_cmp(a));
        Ok(query.page.apply(matching))
    }

    async fn ping(&self) -> StoreResult<u64> {
        Ok(self.inner.read().next_sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;
    use subwatch_core::{Pagination, ProgressStatus, ProjectId, Stage};

    fn at(minute: i64) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-02-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
            + Duration::minutes(minute)
    }

    fn new_event(id: SubmissionId, stage: Stage, status: ProgressStatus, minute: i64) -> NewProgressEvent {
        NewProgressEvent::new(id, stage, status, at(minute))
    }

    #[tokio::test]
    async fn append_assigns_increasing_sequence() {
        let store = InMemoryEventStore::default();
        let id = SubmissionId::new();
        let a = store
            .append(new_event(id, Stage::SubmissionCreated, ProgressStatus::Completed, 0))
            .await
            .unwrap();
        let b = store
            .append(new_event(id, Stage::DocumentGeneration, ProgressStatus::InProgress, 1))
            .await
            .unwrap();
        assert!(b.sequence > a.sequence);
        assert_eq!(store.ping().await.unwrap(), b.sequence);
    }

    #[tokio::test]
    async fn query_by_submission_orders_by_timestamp() {
        let store = InMemoryEventStore::default();
        let id = SubmissionId::new();
        store
            .append(new_event(id, Stage::Review, ProgressStatus::InProgress, 10))
            .await
            .unwrap();
        store
            .append(new_event(id, Stage::SubmissionCreated, ProgressStatus::Completed, 0))
            .await
            .unwrap();
        store
            .append(new_event(SubmissionId::new(), Stage::Review, ProgressStatus::Failed, 5))
            .await
            .unwrap();

        let events = store.query_by_submission(id).await.unwrap();
        let stages: Vec<Stage> = events.iter().map(|e| e.stage).collect();
        assert_eq!(stages, vec![Stage::SubmissionCreated, Stage::Review]);
    }

    #[tokio::test]
    async fn reject_policy_refuses_out_of_order() {
        let store = InMemoryEventStore::new(OrderingPolicy::Reject);
        let id = SubmissionId::new();
        store
            .append(new_event(id, Stage::Review, ProgressStatus::InProgress, 10))
            .await
            .unwrap();
        let err = store
            .append(new_event(id, Stage::SubmissionCreated, ProgressStatus::Completed, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn query_range_filters_and_pages() {
        let store = InMemoryEventStore::default();
        let project = ProjectId::new();
        for minute in 0..5 {
            store
                .append(
                    new_event(SubmissionId::new(), Stage::DocumentGeneration, ProgressStatus::Failed, minute)
                        .with_project(project),
                )
                .await
                .unwrap();
        }
        store
            .append(new_event(SubmissionId::new(), Stage::Review, ProgressStatus::Failed, 9))
            .await
            .unwrap();

        let query = EventQuery {
            stage: Some(Stage::DocumentGeneration),
            project_id: Some(project),
            page: Pagination::new(2, 1, 100).unwrap(),
            ..EventQuery::default()
        };
        let page = store.query_range(&query).await.unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.items.len(), 2);
        // newest first, offset 1 skips minute 4
        assert_eq!(page.items[0].occurred_at, at(3));
    }

    #[tokio::test]
    async fn concurrent_appends_keep_every_event() {
        let store = Arc::new(InMemoryEventStore::default());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .append(new_event(SubmissionId::new(), Stage::Review, ProgressStatus::InProgress, i))
                        .await
                })
            })
            .collect();
        for result in futures::future::join_all(handles).await {
            result.unwrap().unwrap();
        }
        assert_eq!(store.len(), 16);
        assert_eq!(store.ping().await.unwrap(), 16);
    }
}
