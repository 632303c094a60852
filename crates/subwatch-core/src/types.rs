//! Core identifiers and enumerations
//!
//! Defines the vocabulary shared by every monitoring component:
//! - Submission, project and event identifiers
//! - Pipeline stages and per-event progress status
//! - Derived overall submission status
//! - Submission pathways

use crate::error::UnknownVariant;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;
use uuid::Uuid;

/// Identifier of a submission (owned by the external submission table)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(pub Uuid);

impl SubmissionId {
    /// Generate a random submission ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubmissionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SubmissionId {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| UnknownVariant::new("submission id", s))
    }
}

/// Identifier of a project a submission belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub Uuid);

impl ProjectId {
    /// Generate a random project ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProjectId {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| UnknownVariant::new("project id", s))
    }
}

/// Unique progress event identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub Ulid);

impl EventId {
    /// Generate new event ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named step in the submission pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Submission record created
    SubmissionCreated,
    /// Templating/LLM document generation
    DocumentGeneration,
    /// Human or automated review
    Review,
    /// Delivery to the downstream council recipient
    CouncilDelivery,
}

impl Stage {
    /// All stages in pipeline order
    pub const ALL: [Stage; 4] = [
        Stage::SubmissionCreated,
        Stage::DocumentGeneration,
        Stage::Review,
        Stage::CouncilDelivery,
    ];

    /// Wire name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::SubmissionCreated => "submission_created",
            Stage::DocumentGeneration => "document_generation",
            Stage::Review => "review",
            Stage::CouncilDelivery => "council_delivery",
        }
    }

    /// Human-readable label for timelines
    #[inline]
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Stage::SubmissionCreated => "Submission created",
            Stage::DocumentGeneration => "Document generation",
            Stage::Review => "Review",
            Stage::CouncilDelivery => "Council delivery",
        }
    }

    /// Whether completing this stage completes the submission
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::CouncilDelivery)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("stage", s))
    }
}

/// Status carried by a single progress event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    /// Stage queued but not started
    Pending,
    /// Stage running
    InProgress,
    /// Stage finished successfully
    Completed,
    /// Stage failed
    Failed,
}

impl ProgressStatus {
    /// All event statuses
    pub const ALL: [ProgressStatus; 4] = [
        ProgressStatus::Pending,
        ProgressStatus::InProgress,
        ProgressStatus::Completed,
        ProgressStatus::Failed,
    ];

    /// Wire name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStatus::Pending => "pending",
            ProgressStatus::InProgress => "in_progress",
            ProgressStatus::Completed => "completed",
            ProgressStatus::Failed => "failed",
        }
    }

    /// Human-readable label for timelines
    #[inline]
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            ProgressStatus::Pending => "Pending",
            ProgressStatus::InProgress => "In progress",
            ProgressStatus::Completed => "Completed",
            ProgressStatus::Failed => "Failed",
        }
    }
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProgressStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProgressStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("progress status", s))
    }
}

/// Overall status of a submission, derived from its events
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    /// No stage has started yet
    Pending,
    /// Somewhere mid-pipeline
    InProgress,
    /// Terminal stage completed
    Completed,
    /// A failure that no later progress has superseded
    Failed,
}

impl SubmissionStatus {
    /// All overall statuses
    pub const ALL: [SubmissionStatus; 4] = [
        SubmissionStatus::Pending,
        SubmissionStatus::InProgress,
        SubmissionStatus::Completed,
        SubmissionStatus::Failed,
    ];

    /// Wire name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::InProgress => "in_progress",
            SubmissionStatus::Completed => "completed",
            SubmissionStatus::Failed => "failed",
        }
    }

    /// Whether the submission is still moving through the pipeline
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, SubmissionStatus::Pending | SubmissionStatus::InProgress)
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmissionStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SubmissionStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("submission status", s))
    }
}

/// The route a submission takes through the workflow (e.g. `direct_review`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pathway(pub String);

impl Pathway {
    /// Create a pathway from its name
    #[inline]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Pathway name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Pathway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_round_trips_through_wire_name() {
        for stage in Stage::ALL {
            assert_eq!(stage.as_str().parse::<Stage>().unwrap(), stage);
        }
        assert!("shipping".parse::<Stage>().is_err());
    }

    #[test]
    fn only_council_delivery_is_terminal() {
        assert!(Stage::CouncilDelivery.is_terminal());
        assert!(!Stage::Review.is_terminal());
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&ProgressStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        let stage: Stage = serde_json::from_str("\"document_generation\"").unwrap();
        assert_eq!(stage, Stage::DocumentGeneration);
    }

    #[test]
    fn submission_status_activity() {
        assert!(SubmissionStatus::Pending.is_active());
        assert!(SubmissionStatus::InProgress.is_active());
        assert!(!SubmissionStatus::Failed.is_active());
        assert!(!SubmissionStatus::Completed.is_active());
    }

    #[test]
    fn submission_id_parse_rejects_garbage() {
        let id = SubmissionId::new();
        assert_eq!(id.to_string().parse::<SubmissionId>().unwrap(), id);
        let err = "not-a-uuid".parse::<SubmissionId>().unwrap_err();
        assert!(err.to_string().contains("submission id"));
    }
}
