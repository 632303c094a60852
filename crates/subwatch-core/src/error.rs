//! Error types for submission monitoring
//!
//! Provides the error taxonomy shared by all components:
//! - Store failures (ordering conflicts, unavailability)
//! - Monitoring API errors (not found, validation, rate limiting)
//! - Dependency failures from probes and retry invocations
//! - Retryable operation outcomes

use crate::types::SubmissionId;
use chrono::{DateTime, Utc};

/// Unparseable enumerated value or identifier
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: '{value}'")]
pub struct UnknownVariant {
    /// What was being parsed
    pub kind: &'static str,
    /// The rejected input
    pub value: String,
}

impl UnknownVariant {
    /// Create for kind and rejected value
    pub fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

/// Persistence layer errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Out-of-order append rejected under the strict ordering policy
    #[error("out-of-order event for {submission_id}: {occurred_at} precedes {latest}")]
    Conflict {
        submission_id: SubmissionId,
        occurred_at: DateTime<Utc>,
        latest: DateTime<Utc>,
    },

    /// Backing store unreachable or refused the operation
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Stored data violates an invariant
    #[error("corrupt store data: {0}")]
    Corrupt(String),
}

/// Failure of an external collaborator (probe target, retry operation)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{component}: {message}")]
pub struct DependencyError {
    /// Component that failed
    pub component: String,
    /// Failure detail
    pub message: String,
}

impl DependencyError {
    /// Create dependency error for component
    pub fn new(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Main monitoring error type
#[derive(Debug, Clone, thiserror::Error)]
pub enum MonitorError {
    /// Unknown submission, project or retry task
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Malformed filter or request parameter
    #[error("validation failed: {0}")]
    Validation(String),

    /// Caller exceeded its quota
    #[error("rate limited; retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// External collaborator failed
    #[error("dependency failed: {0}")]
    Dependency(#[from] DependencyError),

    /// Persistence failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl MonitorError {
    /// Create not-found error
    #[inline]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Create validation error
    #[inline]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Check if error refers to a missing entity
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if the caller may retry the same request later
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::Dependency(_)
                | Self::Store(StoreError::Unavailable(_))
        )
    }
}

impl From<UnknownVariant> for MonitorError {
    fn from(err: UnknownVariant) -> Self {
        Self::Validation(err.to_string())
    }
}

/// Outcome of a failed retryable operation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OperationError {
    /// Worth retrying after backoff
    #[error("transient failure: {0}")]
    Transient(String),

    /// Retrying cannot help; needs a human
    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl OperationError {
    /// Check if error is retryable
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Failure detail without the classification prefix
    #[inline]
    #[must_use]
    pub fn reason(&self) -> &str {
        match self {
            Self::Transient(reason) | Self::Permanent(reason) => reason,
        }
    }
}

/// Result type alias for monitoring operations
pub type MonitorResult<T> = Result<T, MonitorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monitor_error_display() {
        let err = MonitorError::not_found("submission", "abc");
        assert_eq!(err.to_string(), "submission not found: abc");
        assert!(err.is_not_found());
    }

    #[test]
    fn unknown_variant_becomes_validation() {
        let err: MonitorError = UnknownVariant::new("stage", "shipping").into();
        assert!(matches!(err, MonitorError::Validation(_)));
        assert!(err.to_string().contains("invalid stage: 'shipping'"));
    }

    #[test]
    fn retryable_classification() {
        assert!(MonitorError::RateLimited { retry_after_secs: 2 }.is_retryable());
        assert!(MonitorError::Store(StoreError::Unavailable("down".into())).is_retryable());
        assert!(!MonitorError::validation("bad limit").is_retryable());
        assert!(!MonitorError::Store(StoreError::Corrupt("x".into())).is_retryable());
    }

    #[test]
    fn operation_error_reason() {
        let err = OperationError::Transient("smtp timeout".into());
        assert!(err.is_retryable());
        assert_eq!(err.reason(), "smtp timeout");
        assert!(!OperationError::Permanent("bad address".into()).is_retryable());
    }
}
