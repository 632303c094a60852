//! Shared request state

use crate::auth::AdminAuth;
use crate::config::ServerConfig;
use crate::rate_limit::StatusRateLimiter;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use subwatch_core::SubmissionId;
use subwatch_engine::{Monitor, StatusView};

/// Last-known-good public status entries kept
const STATUS_CACHE_CAPACITY: u64 = 10_000;

/// How long a last-known-good status may be served
const STATUS_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Everything a handler needs, cheap to clone
#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<Monitor>,
    pub auth: Arc<AdminAuth>,
    pub limiter: Arc<StatusRateLimiter>,
    /// Last successful public status per submission
    pub last_known: Cache<SubmissionId, StatusView>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("monitor", &self.monitor)
            .field("auth", &self.auth)
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Build state from server settings
    #[must_use]
    pub fn new(monitor: Arc<Monitor>, config: &ServerConfig) -> Self {
        Self {
            monitor,
            auth: Arc::new(AdminAuth::new(config.admin_tokens.iter().cloned())),
            limiter: Arc::new(StatusRateLimiter::new(&config.rate_limit)),
            last_known: Cache::builder()
                .max_capacity(STATUS_CACHE_CAPACITY)
                .time_to_live(STATUS_CACHE_TTL)
                .build(),
        }
    }
}
