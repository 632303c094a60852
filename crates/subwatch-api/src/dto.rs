//! Response bodies
//!
//! Domain types keep their storage field names; these wrappers give the
//! HTTP surface camelCase JSON.

use chrono::{DateTime, Utc};
use serde::Serialize;
use subwatch_core::{
    ComponentKind, HealthCheckRecord, HealthStatus, Pathway, ProgressStatus, ProjectId,
    RetryStatus, RetryTask, Stage, SubmissionId, SubmissionSnapshot, SubmissionStatus,
};
use subwatch_engine::{Overview, StaleCandidate, StatusView, SubmissionStats, TimelineEntry};

/// One row of a submission listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionSummary {
    pub submission_id: SubmissionId,
    pub project_id: ProjectId,
    pub pathway: Pathway,
    pub status: SubmissionStatus,
    pub latest_stage: Stage,
    pub latest_stage_status: ProgressStatus,
    pub last_event_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub event_count: u64,
}

impl From<SubmissionSnapshot> for SubmissionSummary {
    fn from(s: SubmissionSnapshot) -> Self {
        Self {
            submission_id: s.submission_id,
            project_id: s.project_id,
            pathway: s.pathway,
            status: s.status,
            latest_stage: s.latest_stage,
            latest_stage_status: s.latest_stage_status,
            last_event_at: s.last_event_at,
            created_at: s.created_at,
            completed_at: s.completed_at,
            event_count: s.event_count,
        }
    }
}

/// A retry task as shown to admins
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryTaskSummary {
    pub submission_id: SubmissionId,
    pub stage: Stage,
    pub status: RetryStatus,
    pub attempt_count: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_eligible_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<RetryTask> for RetryTaskSummary {
    fn from(t: RetryTask) -> Self {
        Self {
            submission_id: t.key.submission_id,
            stage: t.key.stage,
            status: t.status,
            attempt_count: t.attempt_count,
            last_attempt_at: t.last_attempt_at,
            next_eligible_at: t.next_eligible_at,
            last_error: t.last_error,
            created_at: t.created_at,
            updated_at: t.updated_at,
        }
    }
}

/// Admin overview
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewBody {
    pub stats: SubmissionStats,
    pub stale_submissions: Vec<StaleCandidate>,
    pub exhausted_retries: Vec<RetryTaskSummary>,
}

impl From<Overview> for OverviewBody {
    fn from(o: Overview) -> Self {
        Self {
            stats: (*o.stats).clone(),
            stale_submissions: o.stale,
            exhausted_retries: o.exhausted_retries.into_iter().map(Into::into).collect(),
        }
    }
}

/// Public status payload
///
/// `degraded` is set when the answer comes from the last-known-good cache
/// or, with nothing cached, carries no status at all.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicStatus {
    pub submission_id: SubmissionId,
    pub status: Option<SubmissionStatus>,
    pub latest_stage: Option<Stage>,
    pub latest_stage_status: Option<ProgressStatus>,
    pub last_event_at: Option<DateTime<Utc>>,
    pub timeline: Vec<TimelineEntry>,
    pub degraded: bool,
}

impl PublicStatus {
    /// Fresh answer
    #[must_use]
    pub fn live(view: StatusView) -> Self {
        Self::from_view(view, false)
    }

    /// Last-known-good answer
    #[must_use]
    pub fn cached(view: StatusView) -> Self {
        Self::from_view(view, true)
    }

    /// No data available
    #[must_use]
    pub fn unavailable(submission_id: SubmissionId) -> Self {
        Self {
            submission_id,
            status: None,
            latest_stage: None,
            latest_stage_status: None,
            last_event_at: None,
            timeline: Vec::new(),
            degraded: true,
        }
    }

    fn from_view(view: StatusView, degraded: bool) -> Self {
        Self {
            submission_id: view.submission_id,
            status: Some(view.status),
            latest_stage: view.latest_stage,
            latest_stage_status: view.latest_stage_status,
            last_event_at: view.last_event_at,
            timeline: view.timeline,
            degraded,
        }
    }
}

/// One historical health record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthRecordBody {
    pub kind: ComponentKind,
    pub name: String,
    pub status: HealthStatus,
    pub detail: Option<String>,
    pub latency_ms: u64,
    pub checked_at: DateTime<Utc>,
}

impl From<HealthCheckRecord> for HealthRecordBody {
    fn from(r: HealthCheckRecord) -> Self {
        Self {
            kind: r.component.kind,
            name: r.component.name,
            status: r.status,
            detail: r.detail,
            latency_ms: r.latency_ms,
            checked_at: r.checked_at,
        }
    }
}
