//! Retry task state
//!
//! A retry task tracks automated recovery of one `(submission, stage)` pair.
//!
//! ```text
//! queued ──claim──▶ in_flight ──ok──▶ succeeded
//!   ▲                  │
//!   └──backoff/abort───┤
//!                      └──ceiling / permanent──▶ exhausted ──requeue──▶ queued
//! ```

use crate::error::UnknownVariant;
use crate::types::{Stage, SubmissionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Single-flight key: at most one active task per pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RetryKey {
    pub submission_id: SubmissionId,
    pub stage: Stage,
}

impl RetryKey {
    /// Create key
    #[inline]
    #[must_use]
    pub fn new(submission_id: SubmissionId, stage: Stage) -> Self {
        Self {
            submission_id,
            stage,
        }
    }
}

impl fmt::Display for RetryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.submission_id, self.stage)
    }
}

/// Lifecycle state of a retry task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStatus {
    Queued,
    InFlight,
    Succeeded,
    Exhausted,
}

impl RetryStatus {
    /// All retry statuses
    pub const ALL: [RetryStatus; 4] = [
        RetryStatus::Queued,
        RetryStatus::InFlight,
        RetryStatus::Succeeded,
        RetryStatus::Exhausted,
    ];

    /// Wire name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RetryStatus::Queued => "queued",
            RetryStatus::InFlight => "in_flight",
            RetryStatus::Succeeded => "succeeded",
            RetryStatus::Exhausted => "exhausted",
        }
    }

    /// Queued or in flight; blocks creation of another task for the key
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, RetryStatus::Queued | RetryStatus::InFlight)
    }

    /// No further automatic transitions
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, RetryStatus::Succeeded | RetryStatus::Exhausted)
    }
}

impl fmt::Display for RetryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetryStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RetryStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("retry status", s))
    }
}

/// Durable retry task row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryTask {
    pub key: RetryKey,
    pub status: RetryStatus,
    /// Failed attempts made by the orchestrator
    pub attempt_count: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_eligible_at: DateTime<Utc>,
    /// Claim expiry while `in_flight`; a later cycle may reclaim after it
    pub lease_expires_at: Option<DateTime<Utc>>,
    /// Why the task exists or why it last failed
    pub last_error: Option<String>,
    /// Optimistic concurrency version, bumped on every write
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RetryTask {
    /// New queued task, eligible immediately
    #[must_use]
    pub fn queued(key: RetryKey, reason: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            key,
            status: RetryStatus::Queued,
            attempt_count: 0,
            last_attempt_at: None,
            next_eligible_at: now,
            lease_expires_at: None,
            last_error: reason,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the orchestrator may claim it at `now`
    #[inline]
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == RetryStatus::Queued && self.next_eligible_at <= now
    }

    /// Whether an in-flight claim has outlived its lease
    #[inline]
    #[must_use]
    pub fn lease_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == RetryStatus::InFlight
            && self.lease_expires_at.map_or(true, |expiry| expiry <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn queued_task_is_due_immediately() {
        let now = Utc::now();
        let task = RetryTask::queued(
            RetryKey::new(SubmissionId::new(), Stage::CouncilDelivery),
            Some("stale".into()),
            now,
        );
        assert!(task.is_due(now));
        assert!(!task.is_due(now - Duration::seconds(1)));
        assert!(task.status.is_active());
    }

    #[test]
    fn lease_expiry_only_applies_in_flight() {
        let now = Utc::now();
        let mut task = RetryTask::queued(
            RetryKey::new(SubmissionId::new(), Stage::Review),
            None,
            now,
        );
        assert!(!task.lease_expired(now));
        task.status = RetryStatus::InFlight;
        task.lease_expires_at = Some(now + Duration::minutes(5));
        assert!(!task.lease_expired(now));
        assert!(task.lease_expired(now + Duration::minutes(5)));
    }

    #[test]
    fn terminal_statuses() {
        assert!(RetryStatus::Exhausted.is_terminal());
        assert!(RetryStatus::Succeeded.is_terminal());
        assert!(!RetryStatus::InFlight.is_terminal());
        assert_eq!("in_flight".parse::<RetryStatus>().unwrap(), RetryStatus::InFlight);
    }
}
