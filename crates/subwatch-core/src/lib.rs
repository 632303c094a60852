//! subwatch core - shared vocabulary for submission monitoring
//!
//! Defines the data model every monitoring component speaks:
//! - Progress events (the append-only audit trail)
//! - Submission snapshots (derived from events, never hand-edited)
//! - Retry tasks (durable recovery state)
//! - Health check records (per-component time series)
//! - The error taxonomy, configuration and the clock seam
//!
//! # Example
//!
//! ```rust
//! use subwatch_core::{ProgressStatus, Stage, SubmissionStatus};
//!
//! let stage: Stage = "document_generation".parse().unwrap();
//! assert_eq!(stage.label(), "Document generation");
//! assert!(SubmissionStatus::InProgress.is_active());
//! assert_eq!(ProgressStatus::Failed.as_str(), "failed");
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod health;
pub mod query;
pub mod retry;
pub mod snapshot;
pub mod types;

// Re-exports for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    AnalyticsConfig, ConfigError, HealthConfig, MonitorConfig, OrderingPolicy, ProbeTarget,
    RetryConfig, StageThresholds, StaleConfig, StoreConfig,
};
pub use error::{
    DependencyError, MonitorError, MonitorResult, OperationError, StoreError, UnknownVariant,
};
pub use event::{Metadata, NewProgressEvent, ProgressEvent};
pub use health::{ComponentId, ComponentKind, HealthCheckRecord, HealthStatus};
pub use query::{DateRange, EventQuery, Page, Pagination, SnapshotOrder, SnapshotQuery};
pub use retry::{RetryKey, RetryStatus, RetryTask};
pub use snapshot::{SubmissionRecord, SubmissionSnapshot};
pub use types::{
    EventId, Pathway, ProgressStatus, ProjectId, Stage, SubmissionId, SubmissionStatus,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with subwatch types
    pub use crate::{
        Clock, MonitorConfig, MonitorError, MonitorResult, NewProgressEvent, ProgressEvent,
        ProgressStatus, ProjectId, RetryKey, RetryTask, Stage, SubmissionId, SubmissionSnapshot,
        SubmissionStatus,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
