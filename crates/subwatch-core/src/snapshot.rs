//! Submission snapshots
//!
//! A snapshot is a derived read model over a submission's progress events.
//! It is never written independently: it is either folded forward one event at
//! a time or re-derived from the full ordered sequence, and both paths must
//! agree.
//!
//! # Status rule
//!
//! The latest event by `(occurred_at, sequence)` wins, with one merge rule: a
//! `failed` submission stays failed until a later `in_progress` or `completed`
//! event supersedes it. A `pending` event does not clear a failure.

use crate::event::ProgressEvent;
use crate::types::{Pathway, ProgressStatus, ProjectId, Stage, SubmissionId, SubmissionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Submission as known to the external submission table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub submission_id: SubmissionId,
    pub project_id: ProjectId,
    pub pathway: Pathway,
    pub created_at: DateTime<Utc>,
}

impl SubmissionRecord {
    /// Create record
    #[must_use]
    pub fn new(
        submission_id: SubmissionId,
        project_id: ProjectId,
        pathway: Pathway,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            submission_id,
            project_id,
            pathway,
            created_at,
        }
    }
}

/// Current state of a submission derived from its events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionSnapshot {
    pub submission_id: SubmissionId,
    pub project_id: ProjectId,
    pub pathway: Pathway,
    pub status: SubmissionStatus,
    pub latest_stage: Stage,
    pub latest_stage_status: ProgressStatus,
    pub last_event_at: DateTime<Utc>,
    /// Append sequence of the event that produced `last_event_at`
    pub last_sequence: u64,
    pub created_at: DateTime<Utc>,
    /// Set when the terminal stage completes
    pub completed_at: Option<DateTime<Utc>>,
    pub event_count: u64,
}

impl SubmissionSnapshot {
    /// Start a snapshot from the first event of a submission
    #[must_use]
    pub fn first(record: &SubmissionRecord, event: &ProgressEvent) -> Self {
        let status = merge_status(None, event);
        Self {
            submission_id: record.submission_id,
            project_id: record.project_id,
            pathway: record.pathway.clone(),
            status,
            latest_stage: event.stage,
            latest_stage_status: event.status,
            last_event_at: event.occurred_at,
            last_sequence: event.sequence,
            created_at: record.created_at,
            completed_at: (status == SubmissionStatus::Completed).then_some(event.occurred_at),
            event_count: 1,
        }
    }

    /// Whether `event` sorts after the event this snapshot was last folded with
    #[inline]
    #[must_use]
    pub fn is_newer(&self, event: &ProgressEvent) -> bool {
        (event.occurred_at, event.sequence) > (self.last_event_at, self.last_sequence)
    }

    /// Fold the next event in timeline order into the snapshot
    pub fn apply(&mut self, event: &ProgressEvent) {
        self.status = merge_status(Some(self.status), event);
        self.latest_stage = event.stage;
        self.latest_stage_status = event.status;
        self.last_event_at = event.occurred_at;
        self.last_sequence = event.sequence;
        self.event_count += 1;
        if self.status == SubmissionStatus::Completed {
            self.completed_at.get_or_insert(event.occurred_at);
        } else {
            self.completed_at = None;
        }
    }

    /// Re-derive a snapshot from a submission's full event sequence
    ///
    /// Returns `None` when there are no events.
    #[must_use]
    pub fn derive(record: &SubmissionRecord, events: &[ProgressEvent]) -> Option<Self> {
        let mut ordered: Vec<&ProgressEvent> = events.iter().collect();
        ordered.sort_by(|a, b| a.timeline_cmp(b));

        let (first, rest) = ordered.split_first()?;
        let mut snapshot = Self::first(record, first);
        for event in rest {
            snapshot.apply(event);
        }
        Some(snapshot)
    }

    /// Minutes since the last event, saturating at zero for future timestamps
    #[inline]
    #[must_use]
    pub fn minutes_inactive(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_event_at).num_minutes().max(0)
    }
}

/// Overall status after applying `event` to a submission currently at `previous`
#[must_use]
pub fn merge_status(previous: Option<SubmissionStatus>, event: &ProgressEvent) -> SubmissionStatus {
    match event.status {
        ProgressStatus::Failed => SubmissionStatus::Failed,
        ProgressStatus::InProgress => SubmissionStatus::InProgress,
        ProgressStatus::Completed if event.stage.is_terminal() => SubmissionStatus::Completed,
        ProgressStatus::Completed => SubmissionStatus::InProgress,
        ProgressStatus::Pending => match previous {
            Some(SubmissionStatus::Failed) => SubmissionStatus::Failed,
            _ => SubmissionStatus::Pending,
        },
    }
}
