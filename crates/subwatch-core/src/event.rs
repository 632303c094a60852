//! Progress events
//!
//! The immutable audit record written on every stage transition. Events are
//! never mutated; the latest event per submission defines its current stage.

use crate::types::{EventId, ProgressStatus, ProjectId, Stage, SubmissionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Structured key-value payload attached to an event
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Metadata key holding the retry attempt number
pub const META_ATTEMPT: &str = "attempt";

/// Metadata key naming the external integration an event concerns
pub const META_INTEGRATION: &str = "integration";

/// Metadata key marking events written by the retry orchestrator
pub const META_RETRY: &str = "retry";

/// Event as submitted by a producer, before the store assigns identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProgressEvent {
    pub submission_id: SubmissionId,
    /// Denormalized from the submission record for project-filtered listings
    pub project_id: Option<ProjectId>,
    pub stage: Stage,
    pub status: ProgressStatus,
    pub detail: Option<String>,
    pub metadata: Option<Metadata>,
    pub occurred_at: DateTime<Utc>,
}

impl NewProgressEvent {
    /// Create event for a stage transition
    #[inline]
    #[must_use]
    pub fn new(
        submission_id: SubmissionId,
        stage: Stage,
        status: ProgressStatus,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            submission_id,
            project_id: None,
            stage,
            status,
            detail: None,
            metadata: None,
            occurred_at,
        }
    }

    /// With owning project
    #[inline]
    #[must_use]
    pub fn with_project(mut self, project_id: ProjectId) -> Self {
        self.project_id = Some(project_id);
        self
    }

    /// With diagnostic detail
    #[inline]
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// With structured metadata
    #[inline]
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Persisted progress event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub id: EventId,
    /// Global append order, assigned by the store
    pub sequence: u64,
    pub submission_id: SubmissionId,
    pub project_id: Option<ProjectId>,
    pub stage: Stage,
    pub status: ProgressStatus,
    pub detail: Option<String>,
    pub metadata: Option<Metadata>,
    pub occurred_at: DateTime<Utc>,
}

impl ProgressEvent {
    /// Materialize a new event with store-assigned identity
    #[must_use]
    pub fn from_new(event: NewProgressEvent, sequence: u64) -> Self {
        Self {
            id: EventId::new(),
            sequence,
            submission_id: event.submission_id,
            project_id: event.project_id,
            stage: event.stage,
            status: event.status,
            detail: event.detail,
            metadata: event.metadata,
            occurred_at: event.occurred_at,
        }
    }

    /// Timeline ordering: timestamp first, append sequence breaks ties
    #[inline]
    #[must_use]
    pub fn timeline_cmp(&self, other: &Self) -> Ordering {
        self.occurred_at
            .cmp(&other.occurred_at)
            .then(self.sequence.cmp(&other.sequence))
    }

    /// Look up a string metadata value
    #[must_use]
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get(key))
            .and_then(serde_json::Value::as_str)
    }

    /// Whether the retry orchestrator wrote this event
    #[must_use]
    pub fn is_retry_outcome(&self) -> bool {
        self.metadata
            .as_ref()
            .and_then(|m| m.get(META_RETRY))
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn event_at(offset_secs: i64, sequence: u64) -> ProgressEvent {
        let base = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        ProgressEvent::from_new(
            NewProgressEvent::new(
                SubmissionId::new(),
                Stage::Review,
                ProgressStatus::InProgress,
                base + Duration::seconds(offset_secs),
            ),
            sequence,
        )
    }

    #[test]
    fn timeline_orders_by_time_then_sequence() {
        let early = event_at(0, 9);
        let late = event_at(10, 1);
        let tie = event_at(0, 10);
        assert_eq!(early.timeline_cmp(&late), Ordering::Less);
        assert_eq!(early.timeline_cmp(&tie), Ordering::Less);
    }

    #[test]
    fn metadata_lookup() {
        let mut meta = Metadata::new();
        meta.insert(META_INTEGRATION.into(), "council_api".into());
        meta.insert(META_RETRY.into(), true.into());
        let mut event = event_at(0, 1);
        event.metadata = Some(meta);
        assert_eq!(event.metadata_str(META_INTEGRATION), Some("council_api"));
        assert!(event.is_retry_outcome());
        assert!(!event_at(0, 2).is_retry_outcome());
    }
}
