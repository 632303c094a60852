//! Health aggregation
//!
//! Each monitored component has one [`HealthProbe`]. A probe cycle runs all
//! probes concurrently, classifies each by outcome and latency, and appends
//! the results to the health time series. There is no inline retry: a failed
//! probe is simply re-run on the next cycle.
//!
//! ## Classification
//!
//! - **healthy**: success under the latency threshold
//! - **degraded**: success over the threshold, or a minor error
//! - **unhealthy**: failure, or no answer within the probe timeout

use crate::tracker::RecordingHealth;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use subwatch_core::{
    Clock, ComponentId, ComponentKind, DependencyError, HealthCheckRecord, HealthConfig,
    HealthStatus, MonitorResult, Page, Pagination, ProbeTarget,
};
use subwatch_store::{EventStore, HealthStore};
use tokio::time::Instant;

/// Lightweight liveness check of one component
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Component this probe reports on
    fn component(&self) -> ComponentId;

    /// Run the check.
    ///
    /// `Ok(None)` is a clean success, `Ok(Some(detail))` a success with a
    /// minor error.
    ///
    /// # Errors
    /// `DependencyError` when the component failed the check
    async fn check(&self) -> Result<Option<String>, DependencyError>;
}

/// Probe of the primary store
///
/// Pings the event store and reports recent recording failures as degraded.
pub struct EventStoreProbe {
    events: Arc<dyn EventStore>,
    recording: Arc<RecordingHealth>,
}

impl EventStoreProbe {
    /// Create probe
    #[must_use]
    pub fn new(events: Arc<dyn EventStore>, recording: Arc<RecordingHealth>) -> Self {
        Self { events, recording }
    }
}

#[async_trait]
impl HealthProbe for EventStoreProbe {
    fn component(&self) -> ComponentId {
        ComponentId::database()
    }

    async fn check(&self) -> Result<Option<String>, DependencyError> {
        self.events
            .ping()
            .await
            .map_err(|e| DependencyError::new(self.component().to_string(), e.to_string()))?;

        let failures = self.recording.consecutive_failures();
        if failures == 0 {
            return Ok(None);
        }
        let last = self
            .recording
            .last_failure()
            .map(|(_, reason)| reason)
            .unwrap_or_default();
        Ok(Some(format!("{failures} recent event recording failures; last: {last}")))
    }
}

/// HTTP GET probe for integrations and AI providers
///
/// 2xx/3xx is healthy, 4xx degraded, 5xx and transport errors unhealthy.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    component: ComponentId,
    url: String,
    client: reqwest::Client,
}

impl HttpProbe {
    /// Create probe for a configured target
    #[must_use]
    pub fn new(kind: ComponentKind, target: &ProbeTarget, client: reqwest::Client) -> Self {
        Self {
            component: ComponentId::new(kind, target.name.clone()),
            url: target.url.clone(),
            client,
        }
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    fn component(&self) -> ComponentId {
        self.component.clone()
    }

    async fn check(&self) -> Result<Option<String>, DependencyError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| DependencyError::new(self.component.to_string(), e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            Err(DependencyError::new(self.component.to_string(), format!("HTTP {status}")))
        } else if status.is_client_error() {
            Ok(Some(format!("HTTP {status}")))
        } else {
            Ok(None)
        }
    }
}

/// HTTP probes for every configured integration and AI provider
#[must_use]
pub fn http_probes(config: &HealthConfig, client: &reqwest::Client) -> Vec<Arc<dyn HealthProbe>> {
    let integrations = config
        .integrations
        .iter()
        .map(|t| (ComponentKind::Integration, t));
    let providers = config.ai_providers.iter().map(|t| (ComponentKind::AiProvider, t));
    integrations
        .chain(providers)
        .map(|(kind, target)| {
            Arc::new(HttpProbe::new(kind, target, client.clone())) as Arc<dyn HealthProbe>
        })
        .collect()
}

/// Current state of a component, `unknown` before its first probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentState {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

impl From<HealthStatus> for ComponentState {
    fn from(status: HealthStatus) -> Self {
        match status {
            HealthStatus::Healthy => Self::Healthy,
            HealthStatus::Degraded => Self::Degraded,
            HealthStatus::Unhealthy => Self::Unhealthy,
        }
    }
}

/// Latest known health of one component
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentHealth {
    pub kind: ComponentKind,
    pub name: String,
    pub status: ComponentState,
    pub detail: Option<String>,
    pub latency_ms: Option<u64>,
    pub checked_at: Option<DateTime<Utc>>,
}

impl ComponentHealth {
    fn unknown(component: ComponentId) -> Self {
        Self {
            kind: component.kind,
            name: component.name,
            status: ComponentState::Unknown,
            detail: None,
            latency_ms: None,
            checked_at: None,
        }
    }
}

impl From<HealthCheckRecord> for ComponentHealth {
    fn from(record: HealthCheckRecord) -> Self {
        Self {
            kind: record.component.kind,
            name: record.component.name,
            status: record.status.into(),
            detail: record.detail,
            latency_ms: Some(record.latency_ms),
            checked_at: Some(record.checked_at),
        }
    }
}

/// Overall system health
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemHealth {
    /// Worst known component status; `unknown` when nothing was probed yet
    pub status: ComponentState,
    pub components: Vec<ComponentHealth>,
}

/// Runs probes and serves current and historical health
pub struct HealthAggregator {
    probes: Vec<Arc<dyn HealthProbe>>,
    store: Arc<dyn HealthStore>,
    config: HealthConfig,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for HealthAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let components: Vec<String> = self.probes.iter().map(|p| p.component().to_string()).collect();
        f.debug_struct("HealthAggregator")
            .field("components", &components)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl HealthAggregator {
    /// Create aggregator without probes
    #[must_use]
    pub fn new(store: Arc<dyn HealthStore>, config: HealthConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            probes: Vec::new(),
            store,
            config,
            clock,
        }
    }

    /// With an additional probe
    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probes.push(probe);
        self
    }

    /// Registered components
    #[must_use]
    pub fn components(&self) -> Vec<ComponentId> {
        self.probes.iter().map(|p| p.component()).collect()
    }

    /// Probe every component once and append the results
    ///
    /// Every record is offered to the store even when an earlier append fails.
    ///
    /// # Errors
    /// The first failure to persist a record
    pub async fn run_once(&self) -> MonitorResult<Vec<HealthCheckRecord>> {
        let records = futures::future::join_all(self.probes.iter().map(|p| self.probe(p.as_ref()))).await;
        let mut first_error = None;
        for record in &records {
            if record.status != HealthStatus::Healthy {
                tracing::warn!(
                    "{} is {}: {}",
                    record.component,
                    record.status,
                    record.detail.as_deref().unwrap_or("-")
                );
            }
            if let Err(e) = self.store.append(record.clone()).await {
                tracing::error!("Failed to persist health of {}: {}", record.component, e);
                first_error.get_or_insert(e);
            }
        }
        tracing::debug!("Health cycle probed {} components", records.len());
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(records),
        }
    }

    async fn probe(&self, probe: &dyn HealthProbe) -> HealthCheckRecord {
        let timeout = Duration::from_millis(self.config.probe_timeout_ms);
        let started = Instant::now();
        let outcome = tokio::time::timeout(timeout, probe.check()).await;
        let latency = started.elapsed();
        let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        let slow = latency_ms > self.config.latency_threshold_ms;

        let (status, detail) = match outcome {
            Err(_) => (
                HealthStatus::Unhealthy,
                Some(format!("no response within {}ms", self.config.probe_timeout_ms)),
            ),
            Ok(Err(e)) => {
                tracing::error!("Probe failed: {}", e);
                (HealthStatus::Unhealthy, Some(e.message))
            }
            Ok(Ok(Some(minor))) => (HealthStatus::Degraded, Some(minor)),
            Ok(Ok(None)) if slow => (
                HealthStatus::Degraded,
                Some(format!(
                    "latency {latency_ms}ms over {}ms threshold",
                    self.config.latency_threshold_ms
                )),
            ),
            Ok(Ok(None)) => (HealthStatus::Healthy, None),
        };

        HealthCheckRecord {
            component: probe.component(),
            status,
            detail,
            latency_ms,
            checked_at: self.clock.now(),
        }
    }

    /// Latest health of each registered component of a kind
    ///
    /// Components with no record yet are reported `unknown`.
    ///
    /// # Errors
    /// Store failures
    pub async fn current(&self, kind: Option<ComponentKind>) -> MonitorResult<Vec<ComponentHealth>> {
        let latest = self.store.latest(kind).await?;
        let mut components: Vec<ComponentHealth> =
            latest.iter().cloned().map(ComponentHealth::from).collect();

        for component in self.components() {
            let known = latest.iter().any(|r| r.component == component);
            if !known && kind.map_or(true, |k| component.kind == k) {
                components.push(ComponentHealth::unknown(component));
            }
        }
        components.sort_by(|a, b| (a.kind, &a.name).cmp(&(b.kind, &b.name)));
        Ok(components)
    }

    /// Overall status across every component
    ///
    /// # Errors
    /// Store failures
    pub async fn system_status(&self) -> MonitorResult<SystemHealth> {
        let components = self.current(None).await?;
        let status = components
            .iter()
            .filter(|c| c.status != ComponentState::Unknown)
            .map(|c| c.status)
            .max()
            .unwrap_or(ComponentState::Unknown);
        Ok(SystemHealth { status, components })
    }

    /// Historical records, newest first
    ///
    /// # Errors
    /// Store failures
    pub async fn history(
        &self,
        since: Option<DateTime<Utc>>,
        page: Pagination,
    ) -> MonitorResult<Page<HealthCheckRecord>> {
        Ok(self.store.history(since, page).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use subwatch_core::{ManualClock, MonitorError, OrderingPolicy, StoreError};
    use subwatch_store::{InMemoryEventStore, InMemoryHealthStore, StoreResult};

    #[derive(Debug)]
    struct Fixed {
        component: ComponentId,
        delay: Duration,
        result: Result<Option<String>, DependencyError>,
    }

    impl Fixed {
        fn new(name: &str, delay_ms: u64, result: Result<Option<String>, DependencyError>) -> Arc<Self> {
            Arc::new(Self {
                component: ComponentId::new(ComponentKind::Integration, name),
                delay: Duration::from_millis(delay_ms),
                result,
            })
        }
    }

    #[async_trait]
    impl HealthProbe for Fixed {
        fn component(&self) -> ComponentId {
            self.component.clone()
        }

        async fn check(&self) -> Result<Option<String>, DependencyError> {
            tokio::time::sleep(self.delay).await;
            self.result.clone()
        }
    }

    fn aggregator() -> HealthAggregator {
        HealthAggregator::new(
            Arc::new(InMemoryHealthStore::new()),
            HealthConfig {
                latency_threshold_ms: 100,
                probe_timeout_ms: 500,
                ..HealthConfig::default()
            },
            Arc::new(ManualClock::new(Utc::now())),
        )
    }

    fn status_of(records: &[HealthCheckRecord], name: &str) -> HealthStatus {
        records
            .iter()
            .find(|r| r.component.name == name)
            .map(|r| r.status)
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn classifies_by_outcome_and_latency() {
        let health = aggregator()
            .with_probe(Fixed::new("fast", 10, Ok(None)))
            .with_probe(Fixed::new("slow", 300, Ok(None)))
            .with_probe(Fixed::new("minor", 10, Ok(Some("HTTP 429".into()))))
            .with_probe(Fixed::new("down", 10, Err(DependencyError::new("down", "refused"))))
            .with_probe(Fixed::new("hung", 10_000, Ok(None)));

        let records = health.run_once().await.unwrap();
        assert_eq!(status_of(&records, "fast"), HealthStatus::Healthy);
        assert_eq!(status_of(&records, "slow"), HealthStatus::Degraded);
        assert_eq!(status_of(&records, "minor"), HealthStatus::Degraded);
        assert_eq!(status_of(&records, "down"), HealthStatus::Unhealthy);
        assert_eq!(status_of(&records, "hung"), HealthStatus::Unhealthy);
    }

    #[tokio::test(start_paused = true)]
    async fn unprobed_components_are_unknown() {
        let health = aggregator()
            .with_probe(Fixed::new("council_api", 1, Ok(None)))
            .with_probe(Fixed::new("email", 1, Ok(None)));

        let system = health.system_status().await.unwrap();
        assert_eq!(system.status, ComponentState::Unknown);
        assert!(system.components.iter().all(|c| c.status == ComponentState::Unknown));

        health.run_once().await.unwrap();
        let system = health.system_status().await.unwrap();
        assert_eq!(system.status, ComponentState::Healthy);
        assert_eq!(health.history(None, Pagination::default()).await.unwrap().total, 2);
    }

    /// Health store refusing its first append
    #[derive(Debug, Default)]
    struct RefusesFirst {
        refused: AtomicBool,
        inner: InMemoryHealthStore,
    }

    #[async_trait]
    impl HealthStore for RefusesFirst {
        async fn append(&self, record: HealthCheckRecord) -> StoreResult<()> {
            if !self.refused.swap(true, Ordering::SeqCst) {
                return Err(StoreError::Unavailable("connection reset".into()));
            }
            self.inner.append(record).await
        }

        async fn latest(&self, kind: Option<ComponentKind>) -> StoreResult<Vec<HealthCheckRecord>> {
            self.inner.latest(kind).await
        }

        async fn history(
            &self,
            since: Option<DateTime<Utc>>,
            page: Pagination,
        ) -> StoreResult<Page<HealthCheckRecord>> {
            self.inner.history(since, page).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_append_does_not_drop_later_records() {
        let store = Arc::new(RefusesFirst::default());
        let health = HealthAggregator::new(
            store.clone(),
            HealthConfig::default(),
            Arc::new(ManualClock::new(Utc::now())),
        )
        .with_probe(Fixed::new("council_api", 1, Ok(None)))
        .with_probe(Fixed::new("email", 1, Ok(None)))
        .with_probe(Fixed::new("payments", 1, Ok(None)));

        let err = health.run_once().await.unwrap_err();
        assert!(matches!(err, MonitorError::Store(StoreError::Unavailable(_))), "{err:?}");

        let kept = store.inner.latest(None).await.unwrap();
        assert_eq!(kept.len(), 2);
    }

    #[tokio::test]
    async fn event_store_probe_reports_recording_failures() {
        let recording = Arc::new(RecordingHealth::new());
        let probe = EventStoreProbe::new(
            Arc::new(InMemoryEventStore::new(OrderingPolicy::Accept)),
            recording.clone(),
        );
        assert_eq!(probe.check().await.unwrap(), None);

        recording.record_failure(Utc::now(), StoreError::Unavailable("pool exhausted".into()).to_string());
        let detail = probe.check().await.unwrap().unwrap();
        assert!(detail.contains("pool exhausted"), "{detail}");
        assert_eq!(probe.component(), ComponentId::database());
    }

    #[test]
    fn http_probes_cover_configured_targets() {
        let config = HealthConfig {
            integrations: vec![ProbeTarget {
                name: "council_portal".into(),
                url: "http://127.0.0.1:9/ping".into(),
            }],
            ai_providers: vec![ProbeTarget {
                name: "drafting_model".into(),
                url: "http://127.0.0.1:9/health".into(),
            }],
            ..HealthConfig::default()
        };
        let components: Vec<ComponentId> = http_probes(&config, &reqwest::Client::new())
            .iter()
            .map(|p| p.component())
            .collect();
        assert_eq!(
            components,
            vec![
                ComponentId::new(ComponentKind::Integration, "council_portal"),
                ComponentId::new(ComponentKind::AiProvider, "drafting_model"),
            ]
        );
    }
}
