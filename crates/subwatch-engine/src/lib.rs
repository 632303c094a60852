//! subwatch engine - monitoring and recovery components
//!
//! Wires the stores from `subwatch-store` into the components that watch
//! submissions move through the pipeline:
//! - [`StageTracker`] records progress events and keeps snapshots current
//! - [`StaleDetector`] finds submissions inactive past their stage threshold
//! - [`RetryOrchestrator`] re-invokes failed stage operations with backoff
//! - [`AnalyticsEngine`] serves dashboard aggregates from TTL caches
//! - [`HealthAggregator`] probes dependencies into a health time series
//! - [`MonitorRuntime`] drives the periodic tasks until shutdown
//!
//! [`Monitor`] bundles them behind one handle for the HTTP surface.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod analytics;
pub mod cache;
pub mod health;
pub mod monitor;
pub mod retry;
pub mod runtime;
pub mod stale;
pub mod tracker;

pub use analytics::{
    AnalyticsEngine, ErrorAnalysis, ErrorGroup, IntegrationMetrics, IntegrationStat,
    PathwayBreakdown, PathwayCount, StatusCounts, SubmissionStats,
};
pub use cache::{CacheStats, TtlCache};
pub use health::{
    http_probes, ComponentHealth, ComponentState, EventStoreProbe, HealthAggregator, HealthProbe,
    HttpProbe, SystemHealth,
};
pub use monitor::{Monitor, MonitorStores, Overview};
pub use retry::{
    CycleReport, OperationRegistry, RetryContext, RetryOrchestrator, RetryQueue,
    RetryableOperation,
};
pub use runtime::MonitorRuntime;
pub use stale::{StaleCandidate, StaleDetector, SweepReport};
pub use tracker::{RecordingHealth, StageTracker, StatusView, TimelineEntry};
