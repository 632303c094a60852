//! Monitor facade
//!
//! Assembles every component over one set of stores and exposes the
//! composite reads the HTTP surface needs.

use crate::analytics::{AnalyticsEngine, SubmissionStats};
use crate::health::{EventStoreProbe, HealthAggregator, HealthProbe};
use crate::retry::{OperationRegistry, RetryOrchestrator, RetryQueue};
use crate::stale::{StaleCandidate, StaleDetector};
use crate::tracker::{RecordingHealth, StageTracker};
use std::sync::Arc;
use subwatch_core::{
    Clock, DateRange, MonitorConfig, MonitorResult, Page, Pagination, ProjectId, RetryStatus,
    RetryTask, SnapshotQuery, SubmissionSnapshot, SystemClock,
};
use subwatch_store::{
    EventStore, HealthStore, InMemoryEventStore, InMemoryHealthStore, InMemoryRetryTaskStore,
    InMemorySnapshotStore, InMemorySubmissionDirectory, RetryTaskStore, SnapshotStore,
    SubmissionDirectory,
};

/// The persistence seams a monitor runs against
#[derive(Clone)]
pub struct MonitorStores {
    pub events: Arc<dyn EventStore>,
    pub snapshots: Arc<dyn SnapshotStore>,
    pub retries: Arc<dyn RetryTaskStore>,
    pub health: Arc<dyn HealthStore>,
    pub directory: Arc<dyn SubmissionDirectory>,
}

impl MonitorStores {
    /// In-memory stores; returns the directory handle for registration
    #[must_use]
    pub fn in_memory(config: &MonitorConfig) -> (Self, Arc<InMemorySubmissionDirectory>) {
        let directory = Arc::new(InMemorySubmissionDirectory::new());
        let stores = Self {
            events: Arc::new(InMemoryEventStore::new(config.store.ordering)),
            snapshots: Arc::new(InMemorySnapshotStore::new()),
            retries: Arc::new(InMemoryRetryTaskStore::new()),
            health: Arc::new(InMemoryHealthStore::new()),
            directory: directory.clone(),
        };
        (stores, directory)
    }
}

/// Admin overview: headline stats, stale submissions and retries needing a human
#[derive(Debug, Clone, PartialEq)]
pub struct Overview {
    pub stats: Arc<SubmissionStats>,
    pub stale: Vec<StaleCandidate>,
    pub exhausted_retries: Vec<RetryTask>,
}

/// Every monitoring component over one set of stores
pub struct Monitor {
    pub tracker: Arc<StageTracker>,
    pub stale: Arc<StaleDetector>,
    pub retries: Arc<RetryOrchestrator>,
    pub analytics: Arc<AnalyticsEngine>,
    pub health: Arc<HealthAggregator>,
    config: MonitorConfig,
    snapshots: Arc<dyn SnapshotStore>,
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("tracker", &self.tracker)
            .field("stale", &self.stale)
            .field("retries", &self.retries)
            .field("analytics", &self.analytics)
            .field("health", &self.health)
            .finish_non_exhaustive()
    }
}

impl Monitor {
    /// Wire all components
    ///
    /// The event-store probe is always registered; pass extra probes (e.g.
    /// from [`http_probes`](crate::health::http_probes)) through `probes`.
    #[must_use]
    pub fn new(
        config: MonitorConfig,
        stores: MonitorStores,
        registry: OperationRegistry,
        probes: Vec<Arc<dyn HealthProbe>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let recording = Arc::new(RecordingHealth::new());
        let queue = Arc::new(RetryQueue::new(
            stores.retries.clone(),
            Arc::new(registry),
            clock.clone(),
        ));

        let tracker = Arc::new(
            StageTracker::new(
                stores.events.clone(),
                stores.snapshots.clone(),
                stores.directory.clone(),
                clock.clone(),
            )
            .with_retry_intake(queue.clone())
            .with_recording_health(recording.clone()),
        );

        let stale = Arc::new(
            StaleDetector::new(stores.snapshots.clone(), config.stale.clone(), clock.clone())
                .with_retry_intake(queue.clone()),
        );

        let retries = Arc::new(RetryOrchestrator::new(
            queue,
            tracker.clone(),
            stores.events.clone(),
            stores.snapshots.clone(),
            config.retry.clone(),
            clock.clone(),
        ));

        let analytics = Arc::new(AnalyticsEngine::new(
            stores.events.clone(),
            stores.snapshots.clone(),
            clock.clone(),
            config.analytics.clone(),
        ));

        let mut health = HealthAggregator::new(stores.health.clone(), config.health.clone(), clock)
            .with_probe(Arc::new(EventStoreProbe::new(stores.events.clone(), recording)));
        for probe in probes {
            health = health.with_probe(probe);
        }

        Self {
            tracker,
            stale,
            retries,
            analytics,
            health: Arc::new(health),
            config,
            snapshots: stores.snapshots,
        }
    }

    /// In-memory monitor on the wall clock with no retryable operations
    #[must_use]
    pub fn in_memory(config: MonitorConfig) -> (Self, Arc<InMemorySubmissionDirectory>) {
        let (stores, directory) = MonitorStores::in_memory(&config);
        let monitor = Self::new(
            config,
            stores,
            OperationRegistry::new(),
            Vec::new(),
            Arc::new(SystemClock),
        );
        (monitor, directory)
    }

    /// Effective configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Stats, stale candidates and exhausted retries
    ///
    /// Exhausted retries are not filtered by project.
    ///
    /// # Errors
    /// Store failures
    pub async fn overview(
        &self,
        project_id: Option<ProjectId>,
        range: DateRange,
    ) -> MonitorResult<Overview> {
        let stats = self.analytics.submission_stats(project_id, range).await?;
        let stale = self.stale.sweep(project_id).await?;
        let exhausted_retries = self
            .retries
            .queue()
            .list(Some(RetryStatus::Exhausted), Pagination::unbounded())
            .await?
            .items;
        Ok(Overview {
            stats,
            stale,
            exhausted_retries,
        })
    }

    /// Snapshot listing
    ///
    /// # Errors
    /// Store failures
    pub async fn list_submissions(
        &self,
        query: &SnapshotQuery,
    ) -> MonitorResult<Page<SubmissionSnapshot>> {
        Ok(self.snapshots.list(query).await?)
    }
}
