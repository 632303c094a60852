use crate::{HealthStore, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use subwatch_core::{ComponentId, ComponentKind, HealthCheckRecord, Page, Pagination};

/// Health time series held in memory
#[derive(Debug, Default)]
pub struct InMemoryHealthStore {
    records: RwLock<Vec<HealthCheckRecord>>,
}

impl InMemoryHealthStore {
    /// Create empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl HealthStore for InMemoryHealthStore {
    async fn append(&self, record: HealthCheckRecord) -> StoreResult<()> {
        self.records.write().push(record);
        Ok(())
    }

    async fn latest(&self, kind: Option<ComponentKind>) -> StoreResult<Vec<HealthCheckRecord>> {
        let records = self.records.read();
        let mut latest: BTreeMap<&ComponentId, &HealthCheckRecord> = BTreeMap::new();
        for record in records
            .iter()
            .filter(|r| kind.map_or(true, |k| r.component.kind == k))
        {
            latest
                .entry(&record.component)
                .and_modify(|current| {
                    if record.checked_at >= current.checked_at {
                        *current = record;
                    }
                })
                .or_insert(record);
        }
        Ok(latest.into_values().cloned().collect())
    }

    async fn history(
        &self,
        since: Option<DateTime<Utc>>,
        page: Pagination,
    ) -> StoreResult<Page<HealthCheckRecord>> {
        let mut matching: Vec<HealthCheckRecord> = self
            .records
            .read()
            .iter()
            .filter(|r| since.map_or(true, |s| r.checked_at >= s))
            .cloned()
            .collect();
        // later appends first on equal timestamps
        matching.reverse();
        matching.sort_by(|a, b| b.checked_at.cmp(&a.checked_at));
        Ok(page.apply(matching))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use subwatch_core::HealthStatus;

    fn record(component: ComponentId, status: HealthStatus, at: DateTime<Utc>) -> HealthCheckRecord {
        HealthCheckRecord {
            component,
            status,
            detail: None,
            latency_ms: 12,
            checked_at: at,
        }
    }

    #[tokio::test]
    async fn latest_keeps_most_recent_per_component() {
        let store = InMemoryHealthStore::new();
        let now = Utc::now();
        let openai = ComponentId::new(ComponentKind::AiProvider, "openai");
        store
            .append(record(openai.clone(), HealthStatus::Unhealthy, now - Duration::minutes(1)))
            .await
            .unwrap();
        store.append(record(openai.clone(), HealthStatus::Healthy, now)).await.unwrap();
        store
            .append(record(ComponentId::database(), HealthStatus::Degraded, now))
            .await
            .unwrap();

        let all = store.latest(None).await.unwrap();
        assert_eq!(all.len(), 2);
        let ai = store.latest(Some(ComponentKind::AiProvider)).await.unwrap();
        assert_eq!(ai.len(), 1);
        assert_eq!(ai[0].status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn history_is_newest_first_and_bounded_by_since() {
        let store = InMemoryHealthStore::new();
        let now = Utc::now();
        for minutes in [30, 20, 10] {
            store
                .append(record(ComponentId::database(), HealthStatus::Healthy, now - Duration::minutes(minutes)))
                .await
                .unwrap();
        }
        let page = store
            .history(Some(now - Duration::minutes(25)), Pagination::default())
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items[0].checked_at, now - Duration::minutes(10));
    }
}
