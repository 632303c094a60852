use crate::{CasResult, InsertOutcome, RetryTaskStore, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::cmp::Reverse;
use subwatch_core::{Page, Pagination, RetryKey, RetryStatus, RetryTask};

/// Retry task rows keyed by `(submission, stage)`
///
/// Every conditional write runs under the key's shard lock, which gives the
/// same guarantee as a conditional `UPDATE ... WHERE version = $n`.
#[derive(Debug, Default)]
pub struct InMemoryRetryTaskStore {
    rows: DashMap<RetryKey, RetryTask>,
}

impl InMemoryRetryTaskStore {
    /// Create empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
impl RetryTaskStore for InMemoryRetryTaskStore {
    async fn get(&self, key: RetryKey) -> StoreResult<Option<RetryTask>> {
        Ok(self.rows.get(&key).map(|row| row.value().clone()))
    }

    async fn insert_if_absent(&self, task: RetryTask) -> StoreResult<InsertOutcome> {
        match self.rows.entry(task.key) {
            Entry::Vacant(slot) => {
                slot.insert(task.clone());
                Ok(InsertOutcome::Inserted(task))
            }
            Entry::Occupied(mut row) => match row.get().status {
                RetryStatus::Queued | RetryStatus::InFlight => {
                    Ok(InsertOutcome::ActiveExists(row.get().clone()))
                }
                RetryStatus::Exhausted => Ok(InsertOutcome::Exhausted(row.get().clone())),
                RetryStatus::Succeeded => {
                    let mut task = task;
                    task.version = row.get().version + 1;
                    row.insert(task.clone());
                    Ok(InsertOutcome::Inserted(task))
                }
            },
        }
    }

    async fn claim(
        &self,
        key: RetryKey,
        expected_version: u64,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> StoreResult<CasResult<RetryTask>> {
        let Some(mut row) = self.rows.get_mut(&key) else {
            return Ok(CasResult::NotFound);
        };
        let task = row.value_mut();
        if task.version != expected_version || task.status != RetryStatus::Queued {
            return Ok(CasResult::Conflict {
                actual_version: task.version,
            });
        }
        task.status = RetryStatus::InFlight;
        task.last_attempt_at = Some(now);
        task.lease_expires_at = Some(lease_until);
        task.updated_at = now;
        task.version += 1;
        Ok(CasResult::Success(task.clone()))
    }

    async fn update(&self, task: RetryTask) -> StoreResult<CasResult<RetryTask>> {
        let Some(mut row) = self.rows.get_mut(&task.key) else {
            return Ok(CasResult::NotFound);
        };
        if row.version != task.version {
            return Ok(CasResult::Conflict {
                actual_version: row.version,
            });
        }
        let mut stored = task;
        stored.version += 1;
        *row = stored.clone();
        Ok(CasResult::Success(stored))
    }

    async fn due(&self, now: DateTime<Utc>, limit: usize) -> StoreResult<Vec<RetryTask>> {
        let mut due: Vec<RetryTask> = self
            .rows
            .iter()
            .filter(|row| row.is_due(now))
            .map(|row| row.value().clone())
            .collect();
        due.sort_by_key(|t| (t.next_eligible_at, t.key));
        due.truncate(limit);
        Ok(due)
    }

    async fn expired_leases(&self, now: DateTime<Utc>) -> StoreResult<Vec<RetryTask>> {
        Ok(self
            .rows
            .iter()
            .filter(|row| row.lease_expired(now))
            .map(|row| row.value().clone())
            .collect())
    }

    async fn list(
        &self,
        status: Option<RetryStatus>,
        page: Pagination,
    ) -> StoreResult<Page<RetryTask>> {
        let mut tasks: Vec<RetryTask> = self
            .rows
            .iter()
            .filter(|row| status.map_or(true, |s| row.status == s))
            .map(|row| row.value().clone())
            .collect();
        tasks.sort_by_key(|t| (Reverse(t.updated_at), t.key));
        Ok(page.apply(tasks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;
    use subwatch_core::{Stage, SubmissionId};

    fn key() -> RetryKey {
        RetryKey::new(SubmissionId::new(), Stage::DocumentGeneration)
    }

    #[tokio::test]
    async fn insert_dedupes_active_tasks() {
        let store = InMemoryRetryTaskStore::new();
        let now = Utc::now();
        let key = key();
        let first = store.insert_if_absent(RetryTask::queued(key, None, now)).await.unwrap();
        let second = store.insert_if_absent(RetryTask::queued(key, None, now)).await.unwrap();
        assert!(first.is_inserted());
        assert!(matches!(second, InsertOutcome::ActiveExists(_)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn succeeded_task_is_replaced_exhausted_is_not() {
        let store = InMemoryRetryTaskStore::new();
        let now = Utc::now();
        let key = key();
        let task = store
            .insert_if_absent(RetryTask::queued(key, None, now))
            .await
            .unwrap()
            .task()
            .clone();

        let mut done = task.clone();
        done.status = RetryStatus::Succeeded;
        let done = store.update(done).await.unwrap().into_success().unwrap();
        let again = store.insert_if_absent(RetryTask::queued(key, None, now)).await.unwrap();
        assert!(again.is_inserted());
        assert!(again.task().version > done.version);

        let mut exhausted = again.task().clone();
        exhausted.status = RetryStatus::Exhausted;
        store.update(exhausted).await.unwrap();
        let blocked = store.insert_if_absent(RetryTask::queued(key, None, now)).await.unwrap();
        assert!(matches!(blocked, InsertOutcome::Exhausted(_)));
    }

    #[tokio::test]
    async fn only_one_concurrent_claim_wins() {
        let store = Arc::new(InMemoryRetryTaskStore::new());
        let now = Utc::now();
        let key = key();
        let task = store
            .insert_if_absent(RetryTask::queued(key, None, now))
            .await
            .unwrap()
            .task()
            .clone();

        let claims: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let version = task.version;
                tokio::spawn(async move {
                    store.claim(key, version, now, now + Duration::minutes(5)).await
                })
            })
            .collect();

        let results: Vec<CasResult<RetryTask>> = futures::future::join_all(claims)
            .await
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .collect();
        assert_eq!(results.iter().filter(|r| r.is_success()).count(), 1);
        assert_eq!(results.iter().filter(|r| r.is_conflict()).count(), 7);

        let stored = store.get(key).await.unwrap().unwrap();
        assert_eq!(stored.status, RetryStatus::InFlight);
        assert_eq!(stored.version, task.version + 1);
    }

    #[tokio::test]
    async fn due_respects_eligibility_and_limit() {
        let store = InMemoryRetryTaskStore::new();
        let now = Utc::now();
        let mut later = RetryTask::queued(key(), None, now);
        later.next_eligible_at = now + Duration::minutes(10);
        store.insert_if_absent(later).await.unwrap();
        for _ in 0..3 {
            store.insert_if_absent(RetryTask::queued(key(), None, now)).await.unwrap();
        }

        assert_eq!(store.due(now, 10).await.unwrap().len(), 3);
        assert_eq!(store.due(now, 2).await.unwrap().len(), 2);
        assert_eq!(store.due(now + Duration::minutes(10), 10).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn stale_update_is_rejected() {
        let store = InMemoryRetryTaskStore::new();
        let now = Utc::now();
        let task = store
            .insert_if_absent(RetryTask::queued(key(), None, now))
            .await
            .unwrap()
            .task()
            .clone();
        store.update(task.clone()).await.unwrap();
        let result = store.update(task).await.unwrap();
        assert_eq!(result, CasResult::Conflict { actual_version: 1 });
    }
}
