//! Dashboard aggregates
//!
//! Four read operations, each behind its own [`TtlCache`] keyed by its filter
//! parameters:
//! - `submission_stats`: counts by status, average completion time, today's count
//! - `pathway_breakdown`: counts per pathway
//! - `error_analysis`: failed events grouped by stage and normalized reason
//! - `integration_metrics`: per-integration outcomes over a rolling window
//!
//! Cached values are only ever replaced on TTL expiry. Two reads inside one
//! TTL window return the same `Arc`, whatever was appended in between.

use crate::cache::TtlCache;
use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use subwatch_core::event::META_INTEGRATION;
use subwatch_core::{
    AnalyticsConfig, Clock, DateRange, EventQuery, MonitorError, MonitorResult, Pathway, ProgressStatus,
    ProjectId, SnapshotQuery, Stage, SubmissionStatus,
};
use subwatch_store::{EventStore, SnapshotStore};

static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}")
        .expect("valid uuid regex")
});
static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("valid number regex"));
static SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid space regex"));

const MAX_REASON_LEN: usize = 120;
const UNSPECIFIED_REASON: &str = "unspecified";

/// Collapse ids, numbers and whitespace so equivalent failures group together
#[must_use]
pub fn normalize_reason(detail: Option<&str>) -> String {
    let Some(detail) = detail.map(str::trim).filter(|d| !d.is_empty()) else {
        return UNSPECIFIED_REASON.to_string();
    };
    let lowered = detail.to_lowercase();
    let reason = UUID_RE.replace_all(&lowered, "<id>");
    let reason = NUMBER_RE.replace_all(&reason, "<n>");
    let reason = SPACE_RE.replace_all(&reason, " ");
    reason.chars().take(MAX_REASON_LEN).collect()
}

/// Submission counts per overall status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub pending: u64,
    pub in_progress: u64,
    pub completed: u64,
    pub failed: u64,
}

impl StatusCounts {
    fn add(&mut self, status: SubmissionStatus) {
        match status {
            SubmissionStatus::Pending => self.pending += 1,
            SubmissionStatus::InProgress => self.in_progress += 1,
            SubmissionStatus::Completed => self.completed += 1,
            SubmissionStatus::Failed => self.failed += 1,
        }
    }

    /// Count for one status
    #[must_use]
    pub fn get(&self, status: SubmissionStatus) -> u64 {
        match status {
            SubmissionStatus::Pending => self.pending,
            SubmissionStatus::InProgress => self.in_progress,
            SubmissionStatus::Completed => self.completed,
            SubmissionStatus::Failed => self.failed,
        }
    }
}

/// Headline submission statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionStats {
    pub total: u64,
    pub by_status: StatusCounts,
    /// Mean creation-to-completion time of completed submissions
    pub average_completion_secs: Option<u64>,
    /// Submissions created since midnight UTC
    pub today_count: u64,
    pub computed_at: DateTime<Utc>,
}

/// Submissions on one pathway
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathwayCount {
    pub pathway: Pathway,
    pub count: u64,
    pub by_status: StatusCounts,
}

/// Counts grouped by pathway, largest first
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathwayBreakdown {
    pub total: u64,
    pub pathways: Vec<PathwayCount>,
    pub computed_at: DateTime<Utc>,
}

/// Failed events sharing a stage and normalized reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorGroup {
    pub stage: Stage,
    pub reason: String,
    pub count: u64,
    pub last_seen: DateTime<Utc>,
}

/// Failure groups ranked by frequency
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorAnalysis {
    pub total_failures: u64,
    pub groups: Vec<ErrorGroup>,
    pub computed_at: DateTime<Utc>,
}

/// Outcome counts for one integration
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationStat {
    pub integration: String,
    pub successes: u64,
    pub failures: u64,
    /// `successes / (successes + failures)`
    pub success_rate: f64,
}

/// Per-integration outcomes over the rolling window
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationMetrics {
    pub window_hours: u64,
    pub integrations: Vec<IntegrationStat>,
    pub computed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct StatsKey {
    project_id: Option<ProjectId>,
    range: DateRange,
}

/// Cached dashboard analytics over the event and snapshot stores
pub struct AnalyticsEngine {
    events: Arc<dyn EventStore>,
    snapshots: Arc<dyn SnapshotStore>,
    clock: Arc<dyn Clock>,
    config: AnalyticsConfig,
    stats: TtlCache<StatsKey, SubmissionStats>,
    pathways: TtlCache<Option<ProjectId>, PathwayBreakdown>,
    errors: TtlCache<(), ErrorAnalysis>,
    integrations: TtlCache<(), IntegrationMetrics>,
}

impl std::fmt::Debug for AnalyticsEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyticsEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AnalyticsEngine {
    /// Create engine with empty caches
    #[must_use]
    pub fn new(
        events: Arc<dyn EventStore>,
        snapshots: Arc<dyn SnapshotStore>,
        clock: Arc<dyn Clock>,
        config: AnalyticsConfig,
    ) -> Self {
        let ttl = config.ttl();
        let capacity = config.max_entries;
        Self {
            events,
            snapshots,
            clock,
            stats: TtlCache::new(capacity, ttl),
            pathways: TtlCache::new(capacity, ttl),
            errors: TtlCache::new(1, ttl),
            integrations: TtlCache::new(1, ttl),
            config,
        }
    }

    /// Counts by status, average completion duration and today's count
    ///
    /// `range` filters on submission creation time.
    ///
    /// # Errors
    /// Store failures (not cached)
    pub async fn submission_stats(
        &self,
        project_id: Option<ProjectId>,
        range: DateRange,
    ) -> MonitorResult<Arc<SubmissionStats>> {
        self.stats
            .try_get_or_insert_with(StatsKey { project_id, range }, || {
                self.compute_stats(project_id, range)
            })
            .await
    }

    /// Counts grouped by pathway
    ///
    /// # Errors
    /// Store failures (not cached)
    pub async fn pathway_breakdown(
        &self,
        project_id: Option<ProjectId>,
    ) -> MonitorResult<Arc<PathwayBreakdown>> {
        self.pathways
            .try_get_or_insert_with(project_id, || self.compute_pathways(project_id))
            .await
    }

    /// Failed events grouped by stage and normalized reason
    ///
    /// # Errors
    /// Store failures (not cached)
    pub async fn error_analysis(&self) -> MonitorResult<Arc<ErrorAnalysis>> {
        self.errors
            .try_get_or_insert_with((), || self.compute_errors())
            .await
    }

    /// Per-integration success and failure counts
    ///
    /// # Errors
    /// - Store failures (not cached)
    /// - `MonitorError::Validation` if the window reaches before the
    ///   representable time range
    pub async fn integration_metrics(&self) -> MonitorResult<Arc<IntegrationMetrics>> {
        self.integrations
            .try_get_or_insert_with((), || self.compute_integrations())
            .await
    }

    /// Pre-compute the unfiltered aggregates
    ///
    /// # Errors
    /// The first store failure
    pub async fn warm(&self) -> MonitorResult<()> {
        self.submission_stats(None, DateRange::default()).await?;
        self.pathway_breakdown(None).await?;
        self.error_analysis().await?;
        self.integration_metrics().await?;
        tracing::debug!("Analytics caches warmed");
        Ok(())
    }

    async fn compute_stats(
        &self,
        project_id: Option<ProjectId>,
        range: DateRange,
    ) -> MonitorResult<SubmissionStats> {
        let query = SnapshotQuery {
            created: range,
            ..SnapshotQuery::all().for_project(project_id)
        };
        let snapshots = self.snapshots.list(&query).await?.items;
        let now = self.clock.now();
        let midnight = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map_or(now, |t| t.and_utc());

        let mut by_status = StatusCounts::default();
        let mut completion_secs: Vec<i64> = Vec::new();
        let mut today_count = 0;
        for snapshot in &snapshots {
            by_status.add(snapshot.status);
            if let Some(completed_at) = snapshot.completed_at {
                completion_secs.push((completed_at - snapshot.created_at).num_seconds().max(0));
            }
            if snapshot.created_at >= midnight {
                today_count += 1;
            }
        }

        let average_completion_secs = if completion_secs.is_empty() {
            None
        } else {
            let sum: i64 = completion_secs.iter().sum();
            let count = i64::try_from(completion_secs.len()).unwrap_or(i64::MAX);
            u64::try_from(sum / count).ok()
        };

        Ok(SubmissionStats {
            total: snapshots.len() as u64,
            by_status,
            average_completion_secs,
            today_count,
            computed_at: now,
        })
    }

    async fn compute_pathways(&self, project_id: Option<ProjectId>) -> MonitorResult<PathwayBreakdown> {
        let snapshots = self
            .snapshots
            .list(&SnapshotQuery::all().for_project(project_id))
            .await?
            .items;

        let mut grouped: BTreeMap<Pathway, StatusCounts> = BTreeMap::new();
        for snapshot in &snapshots {
            grouped.entry(snapshot.pathway.clone()).or_default().add(snapshot.status);
        }

        let mut pathways: Vec<PathwayCount> = grouped
            .into_iter()
            .map(|(pathway, by_status)| PathwayCount {
                count: SubmissionStatus::ALL.iter().map(|s| by_status.get(*s)).sum(),
                pathway,
                by_status,
            })
            .collect();
        pathways.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.pathway.cmp(&b.pathway)));

        Ok(PathwayBreakdown {
            total: snapshots.len() as u64,
            pathways,
            computed_at: self.clock.now(),
        })
    }

    async fn compute_errors(&self) -> MonitorResult<ErrorAnalysis> {
        let failed = self.events.query_range(&EventQuery::failed()).await?.items;

        let mut groups: HashMap<(Stage, String), ErrorGroup> = HashMap::new();
        for event in &failed {
            let reason = normalize_reason(event.detail.as_deref());
            groups
                .entry((event.stage, reason.clone()))
                .and_modify(|g| {
                    g.count += 1;
                    g.last_seen = g.last_seen.max(event.occurred_at);
                })
                .or_insert(ErrorGroup {
                    stage: event.stage,
                    reason,
                    count: 1,
                    last_seen: event.occurred_at,
                });
        }

        let mut groups: Vec<ErrorGroup> = groups.into_values().collect();
        groups.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| b.last_seen.cmp(&a.last_seen))
                .then_with(|| a.stage.cmp(&b.stage))
                .then_with(|| a.reason.cmp(&b.reason))
        });
        groups.truncate(self.config.error_top_n);

        Ok(ErrorAnalysis {
            total_failures: failed.len() as u64,
            groups,
            computed_at: self.clock.now(),
        })
    }

    async fn compute_integrations(&self) -> MonitorResult<IntegrationMetrics> {
        let now = self.clock.now();
        let hours = self.config.integration_window_hours;
        let since = i64::try_from(hours)
            .ok()
            .and_then(Duration::try_hours)
            .and_then(|window| now.checked_sub_signed(window))
            .ok_or_else(|| {
                MonitorError::validation(format!("integration window of {hours} hours is out of range"))
            })?;
        let query = EventQuery {
            range: DateRange::new(Some(since), None)?,
            page: subwatch_core::Pagination::unbounded(),
            ..EventQuery::default()
        };
        let events = self.events.query_range(&query).await?.items;

        let mut counts: BTreeMap<String, (u64, u64)> = BTreeMap::new();
        for event in &events {
            let name = match event.metadata_str(META_INTEGRATION) {
                Some(name) => name.to_string(),
                None if event.stage == Stage::CouncilDelivery => Stage::CouncilDelivery.as_str().to_string(),
                None => continue,
            };
            let entry = counts.entry(name).or_default();
            match event.status {
                ProgressStatus::Completed => entry.0 += 1,
                ProgressStatus::Failed => entry.1 += 1,
                ProgressStatus::Pending | ProgressStatus::InProgress => {}
            }
        }

        let integrations = counts
            .into_iter()
            .filter(|(_, (ok, failed))| ok + failed > 0)
            .map(|(integration, (successes, failures))| {
                #[allow(clippy::cast_precision_loss)]
                let success_rate = successes as f64 / (successes + failures) as f64;
                IntegrationStat {
                    integration,
                    successes,
                    failures,
                    success_rate,
                }
            })
            .collect();

        Ok(IntegrationMetrics {
            window_hours: self.config.integration_window_hours,
            integrations,
            computed_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use subwatch_core::{
        ManualClock, Metadata, NewProgressEvent, OrderingPolicy, SubmissionId, SubmissionSnapshot,
    };
    use subwatch_store::{InMemoryEventStore, InMemorySnapshotStore};

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-07-20T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    struct Fixture {
        engine: AnalyticsEngine,
        events: Arc<InMemoryEventStore>,
        snapshots: Arc<InMemorySnapshotStore>,
    }

    fn fixture(ttl_secs: u64) -> Fixture {
        let events = Arc::new(InMemoryEventStore::new(OrderingPolicy::Accept));
        let snapshots = Arc::new(InMemorySnapshotStore::new());
        let config = AnalyticsConfig {
            ttl_secs,
            error_top_n: 2,
            ..AnalyticsConfig::default()
        };
        let engine = AnalyticsEngine::new(
            events.clone(),
            snapshots.clone(),
            Arc::new(ManualClock::new(now())),
            config,
        );
        Fixture {
            engine,
            events,
            snapshots,
        }
    }

    fn snapshot(project: ProjectId, pathway: &str, status: SubmissionStatus, hours_ago: i64) -> SubmissionSnapshot {
        let created = now() - Duration::hours(hours_ago);
        SubmissionSnapshot {
            submission_id: SubmissionId::new(),
            project_id: project,
            pathway: Pathway::new(pathway),
            status,
            latest_stage: Stage::Review,
            latest_stage_status: ProgressStatus::InProgress,
            last_event_at: created,
            last_sequence: 1,
            created_at: created,
            completed_at: (status == SubmissionStatus::Completed).then(|| created + Duration::minutes(30)),
            event_count: 1,
        }
    }

    #[test]
    fn reasons_normalize_ids_and_numbers() {
        assert_eq!(
            normalize_reason(Some("Timeout after 30s for 6f1c2e34-5b7a-4c8d-9e0f-1a2b3c4d5e6f")),
            "timeout after <n>s for <id>"
        );
        assert_eq!(normalize_reason(Some("   ")), "unspecified");
        assert_eq!(normalize_reason(None), "unspecified");
        assert_eq!(normalize_reason(Some("SMTP\n  refused")), "smtp refused");
    }

    #[tokio::test]
    async fn stats_count_by_status_and_today() {
        let fx = fixture(60);
        let project = ProjectId::new();
        for s in [
            snapshot(project, "direct_review", SubmissionStatus::InProgress, 1),
            snapshot(project, "direct_review", SubmissionStatus::Completed, 30),
            snapshot(project, "staged_review", SubmissionStatus::Failed, 2),
            snapshot(ProjectId::new(), "direct_review", SubmissionStatus::Pending, 1),
        ] {
            fx.snapshots.put(s).await.unwrap();
        }

        let stats = fx.engine.submission_stats(Some(project), DateRange::default()).await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(
            stats.by_status,
            StatusCounts {
                pending: 0,
                in_progress: 1,
                completed: 1,
                failed: 1
            }
        );
        assert_eq!(stats.average_completion_secs, Some(1800));
        assert_eq!(stats.today_count, 2);

        let range = DateRange::new(Some(now() - Duration::hours(3)), None).unwrap();
        let recent = fx.engine.submission_stats(Some(project), range).await.unwrap();
        assert_eq!(recent.total, 2);
    }

    #[tokio::test]
    async fn stats_are_stable_within_ttl() {
        let fx = fixture(60);
        let project = ProjectId::new();
        fx.snapshots
            .put(snapshot(project, "direct_review", SubmissionStatus::InProgress, 1))
            .await
            .unwrap();

        let first = fx.engine.submission_stats(None, DateRange::default()).await.unwrap();
        fx.snapshots
            .put(snapshot(project, "direct_review", SubmissionStatus::Failed, 1))
            .await
            .unwrap();
        let second = fx.engine.submission_stats(None, DateRange::default()).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.total, 1);
    }

    #[tokio::test]
    async fn pathway_breakdown_orders_by_count() {
        let fx = fixture(60);
        let project = ProjectId::new();
        for (pathway, status) in [
            ("staged_review", SubmissionStatus::InProgress),
            ("direct_review", SubmissionStatus::Completed),
            ("direct_review", SubmissionStatus::Failed),
        ] {
            fx.snapshots.put(snapshot(project, pathway, status, 1)).await.unwrap();
        }
        let breakdown = fx.engine.pathway_breakdown(Some(project)).await.unwrap();
        assert_eq!(breakdown.total, 3);
        assert_eq!(breakdown.pathways[0].pathway.as_str(), "direct_review");
        assert_eq!(breakdown.pathways[0].count, 2);
        assert_eq!(breakdown.pathways[0].by_status.failed, 1);
    }

    #[tokio::test]
    async fn error_analysis_ranks_and_truncates() {
        let fx = fixture(60);
        let failures = [
            (Stage::DocumentGeneration, "LLM timeout after 30s"),
            (Stage::DocumentGeneration, "LLM timeout after 45s"),
            (Stage::DocumentGeneration, "LLM timeout after 60s"),
            (Stage::CouncilDelivery, "SMTP 550 rejected"),
            (Stage::CouncilDelivery, "SMTP 421 rejected"),
            (Stage::Review, "reviewer unavailable"),
        ];
        for (i, (stage, detail)) in failures.iter().enumerate() {
            fx.events
                .append(
                    NewProgressEvent::new(
                        SubmissionId::new(),
                        *stage,
                        ProgressStatus::Failed,
                        now() - Duration::minutes(i as i64),
                    )
                    .with_detail(*detail),
                )
                .await
                .unwrap();
        }

        let analysis = fx.engine.error_analysis().await.unwrap();
        assert_eq!(analysis.total_failures, 6);
        assert_eq!(analysis.groups.len(), 2);
        assert_eq!(analysis.groups[0].reason, "llm timeout after <n>s");
        assert_eq!(analysis.groups[0].count, 3);
        assert_eq!(analysis.groups[1].stage, Stage::CouncilDelivery);
    }

    #[tokio::test]
    async fn integration_metrics_use_rolling_window() {
        let fx = fixture(60);
        let mut council = Metadata::new();
        council.insert(META_INTEGRATION.into(), "council_api".into());
        let cases = [
            (ProgressStatus::Completed, 1),
            (ProgressStatus::Completed, 2),
            (ProgressStatus::Failed, 3),
            (ProgressStatus::Failed, 48),
        ];
        for (status, hours_ago) in cases {
            fx.events
                .append(
                    NewProgressEvent::new(
                        SubmissionId::new(),
                        Stage::CouncilDelivery,
                        status,
                        now() - Duration::hours(hours_ago),
                    )
                    .with_metadata(council.clone()),
                )
                .await
                .unwrap();
        }

        let metrics = fx.engine.integration_metrics().await.unwrap();
        assert_eq!(metrics.integrations.len(), 1);
        let stat = &metrics.integrations[0];
        assert_eq!(stat.integration, "council_api");
        assert_eq!((stat.successes, stat.failures), (2, 1));
        assert!((stat.success_rate - 2.0 / 3.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn oversized_integration_window_is_a_validation_error() {
        let config = AnalyticsConfig {
            integration_window_hours: 10_000_000_000_000,
            ..AnalyticsConfig::default()
        };
        let engine = AnalyticsEngine::new(
            Arc::new(InMemoryEventStore::new(OrderingPolicy::Accept)),
            Arc::new(InMemorySnapshotStore::new()),
            Arc::new(ManualClock::new(now())),
            config,
        );

        let err = engine.integration_metrics().await.unwrap_err();
        assert!(matches!(err, MonitorError::Validation(_)), "{err}");
        assert!(engine.warm().await.is_err());
    }
}
