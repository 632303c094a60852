use crate::{CasResult, SnapshotStore, StoreResult};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::cmp::Reverse;
use subwatch_core::{Page, SnapshotOrder, SnapshotQuery, SubmissionId, SubmissionSnapshot};

/// Snapshot cache keyed by submission
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    rows: DashMap<SubmissionId, SubmissionSnapshot>,
}

impl InMemorySnapshotStore {
    /// Create empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of snapshots
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
impl SnapshotStore for InMemorySnapshotStore {
    async fn get(&self, id: SubmissionId) -> StoreResult<Option<SubmissionSnapshot>> {
        Ok(self.rows.get(&id).map(|row| row.value().clone()))
    }

    async fn compare_and_put(
        &self,
        snapshot: SubmissionSnapshot,
        expected_event_count: Option<u64>,
    ) -> StoreResult<CasResult<SubmissionSnapshot>> {
        match (self.rows.entry(snapshot.submission_id), expected_event_count) {
            (Entry::Vacant(slot), None) => {
                slot.insert(snapshot.clone());
                Ok(CasResult::Success(snapshot))
            }
            (Entry::Vacant(_), Some(_)) => Ok(CasResult::NotFound),
            (Entry::Occupied(row), None) => Ok(CasResult::Conflict {
                actual_version: row.get().event_count,
            }),
            (Entry::Occupied(mut row), Some(expected)) => {
                if row.get().event_count == expected {
                    row.insert(snapshot.clone());
                    Ok(CasResult::Success(snapshot))
                } else {
                    Ok(CasResult::Conflict {
                        actual_version: row.get().event_count,
                    })
                }
            }
        }
    }

    async fn put(&self, snapshot: SubmissionSnapshot) -> StoreResult<()> {
        self.rows.insert(snapshot.submission_id, snapshot);
        Ok(())
    }

    async fn list(&self, query: &SnapshotQuery) -> StoreResult<Page<SubmissionSnapshot>> {
        let mut matching: Vec<SubmissionSnapshot> = self
            .rows
            .iter()
            .map(|row| row.value().clone())
            .filter(|s| query.project_id.map_or(true, |p| s.project_id == p))
            .filter(|s| query.status.map_or(true, |st| s.status == st))
            .filter(|s| query.pathway.as_ref().map_or(true, |p| &s.pathway == p))
            .filter(|s| query.created.contains(s.created_at))
            .collect();

        match query.order {
            SnapshotOrder::RecentActivity => {
                matching.sort_by_key(|s| (Reverse(s.last_event_at), Reverse(s.last_sequence)));
            }
            SnapshotOrder::Created => {
                matching.sort_by_key(|s| (Reverse(s.created_at), s.submission_id));
            }
        }
        Ok(query.page.apply(matching))
    }
}
