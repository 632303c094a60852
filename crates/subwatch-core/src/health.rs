//! Health check records
//!
//! Append-only time series, one series per monitored component. The current
//! health of a component is its most recent record.

use crate::error::UnknownVariant;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Category of monitored component
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    /// Primary store
    Database,
    /// Third-party integration (delivery channel, council API)
    Integration,
    /// LLM / AI provider
    AiProvider,
}

impl ComponentKind {
    /// Wire name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Database => "database",
            ComponentKind::Integration => "integration",
            ComponentKind::AiProvider => "ai_provider",
        }
    }
}

impl FromStr for ComponentKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "database" => Ok(ComponentKind::Database),
            "integration" => Ok(ComponentKind::Integration),
            "ai_provider" => Ok(ComponentKind::AiProvider),
            other => Err(UnknownVariant::new("component kind", other)),
        }
    }
}

/// A monitored component
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ComponentId {
    pub kind: ComponentKind,
    pub name: String,
}

impl ComponentId {
    /// Create component id
    pub fn new(kind: ComponentKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    /// The primary store
    #[must_use]
    pub fn database() -> Self {
        Self::new(ComponentKind::Database, "primary")
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.name)
    }
}

/// Probe classification, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Succeeded under the latency threshold
    Healthy,
    /// Succeeded slowly or with a minor error
    Degraded,
    /// Failed or timed out
    Unhealthy,
}

impl HealthStatus {
    /// Wire name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }

    /// Most severe of a set of statuses; `None` for an empty set
    pub fn worst(statuses: impl IntoIterator<Item = HealthStatus>) -> Option<HealthStatus> {
        statuses.into_iter().max()
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One probe result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckRecord {
    pub component: ComponentId,
    pub status: HealthStatus,
    pub detail: Option<String>,
    pub latency_ms: u64,
    pub checked_at: DateTime<Utc>,
}
