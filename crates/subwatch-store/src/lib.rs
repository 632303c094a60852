//! Pluggable persistence for submission monitoring
//!
//! The traits in this crate are the seams to the transactional relational
//! store the monitoring engine runs against. The engine never locks at the
//! application level; it relies on the guarantees spelled out here.
//!
//! ## Design Principles
//!
//! - **Append-only events**: no update or delete API for progress events
//! - **CAS semantics**: snapshot and retry-task writes are conditional on the
//!   version the writer read, so concurrent writers cannot clobber each other
//! - **Testability**: in-memory implementations in [`memory`]

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use subwatch_core::{
    ComponentKind, EventQuery, HealthCheckRecord, NewProgressEvent, Page, Pagination,
    ProgressEvent, RetryKey, RetryStatus, RetryTask, SnapshotQuery, StoreError, SubmissionId,
    SubmissionRecord, SubmissionSnapshot,
};

pub use memory::{
    InMemoryEventStore, InMemoryHealthStore, InMemoryRetryTaskStore, InMemorySnapshotStore,
    InMemorySubmissionDirectory,
};

/// Result alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Result of a compare-and-swap write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasResult<T> {
    /// Write applied; carries the stored value
    Success(T),
    /// Row does not exist
    NotFound,
    /// Row changed since it was read
    Conflict {
        /// Version currently stored
        actual_version: u64,
    },
}

impl<T> CasResult<T> {
    /// Returns true if the write was applied
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns true if another writer got there first
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Stored value on success
    #[must_use]
    pub fn into_success(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }
}

/// Outcome of creating a retry task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// New task stored
    Inserted(RetryTask),
    /// A queued or in-flight task already covers the key
    ActiveExists(RetryTask),
    /// The key is exhausted and waits for manual action
    Exhausted(RetryTask),
}

impl InsertOutcome {
    /// Returns true if a new task was created
    #[must_use]
    pub const fn is_inserted(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }

    /// The task now stored for the key
    #[must_use]
    pub fn task(&self) -> &RetryTask {
        match self {
            Self::Inserted(task) | Self::ActiveExists(task) | Self::Exhausted(task) => task,
        }
    }
}

/// Append-only ledger of progress events
///
/// `append` must be safe under concurrent writers; implementations rely on
/// the backing store's row-level isolation rather than a global lock.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persists an event and assigns its identity and append sequence.
    ///
    /// # Errors
    /// `StoreError::Conflict` only under the `reject` ordering policy when the
    /// event predates the submission's latest event.
    async fn append(&self, event: NewProgressEvent) -> StoreResult<ProgressEvent>;

    /// Events of one submission in timeline order.
    async fn query_by_submission(&self, id: SubmissionId) -> StoreResult<Vec<ProgressEvent>>;

    /// Filtered, paginated listing, newest first.
    async fn query_range(&self, query: &EventQuery) -> StoreResult<Page<ProgressEvent>>;

    /// Lightweight liveness check; returns the latest assigned sequence.
    async fn ping(&self) -> StoreResult<u64>;
}

/// Materialized submission snapshots
///
/// A derived cache, rebuildable from events.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Snapshot of one submission.
    async fn get(&self, id: SubmissionId) -> StoreResult<Option<SubmissionSnapshot>>;

    /// Writes `snapshot` if the stored row still has `expected_event_count`
    /// events (`None` = row must not exist yet).
    async fn compare_and_put(
        &self,
        snapshot: SubmissionSnapshot,
        expected_event_count: Option<u64>,
    ) -> StoreResult<CasResult<SubmissionSnapshot>>;

    /// Unconditional write, used by rebuilds.
    async fn put(&self, snapshot: SubmissionSnapshot) -> StoreResult<()>;

    /// Filtered, paginated listing.
    async fn list(&self, query: &SnapshotQuery) -> StoreResult<Page<SubmissionSnapshot>>;
}

/// Durable retry task rows, one per `(submission, stage)`
#[async_trait]
pub trait RetryTaskStore: Send + Sync {
    /// Task for a key.
    async fn get(&self, key: RetryKey) -> StoreResult<Option<RetryTask>>;

    /// Stores `task` unless an active or exhausted task already holds the key.
    /// A succeeded task is replaced.
    async fn insert_if_absent(&self, task: RetryTask) -> StoreResult<InsertOutcome>;

    /// Atomically moves a queued task at `expected_version` to `in_flight`.
    ///
    /// Exactly one of several concurrent claims on the same version succeeds.
    async fn claim(
        &self,
        key: RetryKey,
        expected_version: u64,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> StoreResult<CasResult<RetryTask>>;

    /// Replaces the row if its stored version equals `task.version`; the
    /// stored copy gets `version + 1`.
    async fn update(&self, task: RetryTask) -> StoreResult<CasResult<RetryTask>>;

    /// Queued tasks with `next_eligible_at <= now`, earliest first.
    async fn due(&self, now: DateTime<Utc>, limit: usize) -> StoreResult<Vec<RetryTask>>;

    /// In-flight tasks whose lease has expired.
    async fn expired_leases(&self, now: DateTime<Utc>) -> StoreResult<Vec<RetryTask>>;

    /// Listing by status, most recently updated first.
    async fn list(
        &self,
        status: Option<RetryStatus>,
        page: Pagination,
    ) -> StoreResult<Page<RetryTask>>;
}

/// Per-component health time series
#[async_trait]
pub trait HealthStore: Send + Sync {
    /// Appends one probe result.
    async fn append(&self, record: HealthCheckRecord) -> StoreResult<()>;

    /// Most recent record per component, optionally restricted to one kind.
    async fn latest(&self, kind: Option<ComponentKind>) -> StoreResult<Vec<HealthCheckRecord>>;

    /// Records checked at or after `since`, newest first.
    async fn history(
        &self,
        since: Option<DateTime<Utc>>,
        page: Pagination,
    ) -> StoreResult<Page<HealthCheckRecord>>;
}

/// Read access to the external submission table
#[async_trait]
pub trait SubmissionDirectory: Send + Sync {
    /// Submission record, or `None` if the table does not know it.
    async fn lookup(&self, id: SubmissionId) -> StoreResult<Option<SubmissionRecord>>;
}
