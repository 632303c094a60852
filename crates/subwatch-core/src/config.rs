//! Monitoring configuration
//!
//! Every field has a conservative default so an empty TOML document is a
//! valid configuration. Thresholds, backoff and TTLs are deliberately
//! configuration rather than constants.

use crate::types::Stage;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Invalid configuration value
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid configuration: {field}: {message}")]
pub struct ConfigError {
    /// Dotted path of the offending field
    pub field: &'static str,
    /// What is wrong with it
    pub message: String,
}

impl ConfigError {
    /// Create error for a field
    #[must_use]
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// How the event store treats an event older than the submission's latest
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderingPolicy {
    /// Store it; ordering is by timestamp (tolerates producer clock skew)
    #[default]
    Accept,
    /// Reject with a conflict
    Reject,
}

/// Event store settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub ordering: OrderingPolicy,
}

/// Per-stage inactivity thresholds in minutes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageThresholds {
    pub submission_created: u64,
    pub document_generation: u64,
    pub review: u64,
    pub council_delivery: u64,
}

impl StageThresholds {
    /// Threshold for a stage
    #[inline]
    #[must_use]
    pub fn minutes_for(&self, stage: Stage) -> u64 {
        match stage {
            Stage::SubmissionCreated => self.submission_created,
            Stage::DocumentGeneration => self.document_generation,
            Stage::Review => self.review,
            Stage::CouncilDelivery => self.council_delivery,
        }
    }

    /// Override one stage
    #[must_use]
    pub fn with(mut self, stage: Stage, minutes: u64) -> Self {
        match stage {
            Stage::SubmissionCreated => self.submission_created = minutes,
            Stage::DocumentGeneration => self.document_generation = minutes,
            Stage::Review => self.review = minutes,
            Stage::CouncilDelivery => self.council_delivery = minutes,
        }
        self
    }
}

impl Default for StageThresholds {
    fn default() -> Self {
        Self {
            submission_created: 240,
            document_generation: 120,
            review: 90,
            council_delivery: 30,
        }
    }
}

/// Stale detector settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaleConfig {
    pub sweep_interval_secs: u64,
    pub thresholds: StageThresholds,
    /// Feed candidates with a registered operation to the retry orchestrator
    pub enqueue_retries: bool,
}

impl Default for StaleConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 300,
            thresholds: StageThresholds::default(),
            enqueue_retries: true,
        }
    }
}

/// Retry orchestrator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub poll_interval_secs: u64,
    pub base_delay_secs: u64,
    pub multiplier: f64,
    pub max_delay_secs: u64,
    /// Failed attempts before a task is exhausted
    pub max_attempts: u32,
    pub lease_secs: u64,
    pub operation_timeout_secs: u64,
    /// Tasks claimed per cycle
    pub batch_size: usize,
}

impl RetryConfig {
    /// Delay before the next attempt after `attempt` failures
    ///
    /// `base * multiplier^(attempt - 1)`, capped at `max_delay`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(64);
        let exponent = i32::try_from(exponent).unwrap_or(i32::MAX);
        #[allow(clippy::cast_precision_loss)]
        let raw = self.base_delay_secs as f64 * self.multiplier.powi(exponent);
        #[allow(clippy::cast_precision_loss)]
        let capped = raw.min(self.max_delay_secs as f64);
        Duration::from_secs_f64(capped)
    }

    /// With attempt ceiling
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            base_delay_secs: 60,
            multiplier: 2.0,
            max_delay_secs: 3600,
            max_attempts: 5,
            lease_secs: 300,
            operation_timeout_secs: 120,
            batch_size: 50,
        }
    }
}

/// Analytics cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub ttl_secs: u64,
    pub max_entries: u64,
    pub integration_window_hours: u64,
    pub error_top_n: usize,
    /// Pre-compute unfiltered aggregates on this interval; disabled when unset
    pub warm_interval_secs: Option<u64>,
}

impl AnalyticsConfig {
    /// Longest accepted integration metrics window
    pub const MAX_INTEGRATION_WINDOW_HOURS: u64 = 24 * 366;

    /// Cache time-to-live
    #[inline]
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 90,
            max_entries: 1000,
            integration_window_hours: 24,
            error_top_n: 20,
            warm_interval_secs: None,
        }
    }
}

/// HTTP endpoint probed for health
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeTarget {
    pub name: String,
    pub url: String,
}

/// Health aggregator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub interval_secs: u64,
    /// Successful probes slower than this are degraded
    pub latency_threshold_ms: u64,
    /// Probes slower than this are unhealthy
    pub probe_timeout_ms: u64,
    pub integrations: Vec<ProbeTarget>,
    pub ai_providers: Vec<ProbeTarget>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            latency_threshold_ms: 1000,
            probe_timeout_ms: 5000,
            integrations: Vec::new(),
            ai_providers: Vec::new(),
        }
    }
}

/// Top-level monitoring configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub store: StoreConfig,
    pub stale: StaleConfig,
    pub retry: RetryConfig,
    pub analytics: AnalyticsConfig,
    pub health: HealthConfig,
}

impl MonitorConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from TOML text
    ///
    /// # Errors
    /// Returns the TOML error message on malformed input or invalid values
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(text).map_err(|e| ConfigError::new("<document>", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// With retry settings
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// With stale thresholds
    #[inline]
    #[must_use]
    pub fn with_thresholds(mut self, thresholds: StageThresholds) -> Self {
        self.stale.thresholds = thresholds;
        self
    }

    /// With analytics cache TTL
    #[inline]
    #[must_use]
    pub fn with_analytics_ttl(mut self, ttl_secs: u64) -> Self {
        self.analytics.ttl_secs = ttl_secs;
        self
    }

    /// Check cross-field constraints
    ///
    /// # Errors
    /// The first invalid field found
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stale.sweep_interval_secs == 0 {
            return Err(ConfigError::new("stale.sweep_interval_secs", "must be > 0"));
        }
        let retry = &self.retry;
        if retry.poll_interval_secs == 0 {
            return Err(ConfigError::new("retry.poll_interval_secs", "must be > 0"));
        }
        if retry.max_attempts == 0 {
            return Err(ConfigError::new("retry.max_attempts", "must be > 0"));
        }
        if retry.base_delay_secs == 0 {
            return Err(ConfigError::new("retry.base_delay_secs", "must be > 0"));
        }
        if retry.multiplier.is_nan() || retry.multiplier <= 1.0 {
            return Err(ConfigError::new("retry.multiplier", "must be > 1.0"));
        }
        if retry.max_delay_secs < retry.base_delay_secs {
            return Err(ConfigError::new(
                "retry.max_delay_secs",
                "must be >= retry.base_delay_secs",
            ));
        }
        if retry.lease_secs == 0 || retry.batch_size == 0 {
            return Err(ConfigError::new("retry.lease_secs", "lease and batch size must be > 0"));
        }
        if self.analytics.ttl_secs == 0 {
            return Err(ConfigError::new("analytics.ttl_secs", "must be > 0"));
        }
        let window = self.analytics.integration_window_hours;
        if window == 0 || window > AnalyticsConfig::MAX_INTEGRATION_WINDOW_HOURS {
            return Err(ConfigError::new(
                "analytics.integration_window_hours",
                format!(
                    "must be between 1 and {}",
                    AnalyticsConfig::MAX_INTEGRATION_WINDOW_HOURS
                ),
            ));
        }
        if self.analytics.warm_interval_secs == Some(0) {
            return Err(ConfigError::new("analytics.warm_interval_secs", "must be > 0"));
        }
        if self.health.interval_secs == 0 || self.health.probe_timeout_ms == 0 {
            return Err(ConfigError::new("health.interval_secs", "intervals must be > 0"));
        }
        Ok(())
    }
}
