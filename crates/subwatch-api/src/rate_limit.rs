//! Per-client quota for the public status endpoint
//!
//! Each client may make `requests_per_minute` accepted requests in any
//! sliding 60 second window. The client key is the first `X-Forwarded-For`
//! hop when present, else the peer address. Requests over quota are rejected
//! with `MonitorError::RateLimited` carrying the wait in seconds and do not
//! count against the window.

use crate::config::RateLimitConfig;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Duration;
use subwatch_core::MonitorError;
use tokio::time::Instant;
use warp::{Filter, Rejection};

/// Quota window
const WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window limiter over client identifiers
#[derive(Debug)]
pub struct StatusRateLimiter {
    /// Accepted request times per client, oldest first
    windows: DashMap<String, VecDeque<Instant>>,
    enabled: bool,
    requests_per_minute: usize,
}

impl StatusRateLimiter {
    /// Create limiter
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            windows: DashMap::new(),
            enabled: config.enabled,
            requests_per_minute: usize::try_from(config.requests_per_minute.max(1))
                .unwrap_or(usize::MAX),
        }
    }

    /// Consume one request for `client`
    ///
    /// # Errors
    /// `MonitorError::RateLimited` when the client is over quota
    pub fn check(&self, client: &str) -> Result<(), MonitorError> {
        if !self.enabled {
            return Ok(());
        }
        let now = Instant::now();
        let mut accepted = self.windows.entry(client.to_string()).or_default();
        while accepted
            .front()
            .is_some_and(|t| now.duration_since(*t) >= WINDOW)
        {
            accepted.pop_front();
        }

        if accepted.len() < self.requests_per_minute {
            accepted.push_back(now);
            return Ok(());
        }

        let oldest = accepted.front().copied().unwrap_or(now);
        let wait = WINDOW.saturating_sub(now.duration_since(oldest));
        tracing::warn!(
            "Status rate limit exceeded for {} ({} req/min)",
            client,
            self.requests_per_minute
        );
        Err(MonitorError::RateLimited {
            retry_after_secs: ceil_secs(wait).max(1),
        })
    }

    /// Drop clients with no request inside the window
    pub fn prune(&self) {
        let now = Instant::now();
        self.windows
            .retain(|_, accepted| accepted.back().is_some_and(|t| now.duration_since(*t) < WINDOW));
        self.windows.shrink_to_fit();
    }

    /// Tracked client count
    #[must_use]
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

/// Client identifier for quota accounting
#[must_use]
pub fn client_key(forwarded_for: Option<&str>, remote: Option<SocketAddr>) -> String {
    forwarded_for
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
        .map(ToString::to_string)
        .or_else(|| remote.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Filter extracting the client key
pub fn client() -> impl Filter<Extract = (String,), Error = Rejection> + Clone {
    warp::header::optional::<String>("x-forwarded-for")
        .and(warp::addr::remote())
        .map(|forwarded: Option<String>, remote: Option<SocketAddr>| {
            client_key(forwarded.as_deref(), remote)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    const CLIENT: &str = "203.0.113.7";

    fn accepted(limiter: &StatusRateLimiter, n: usize) -> usize {
        (0..n).filter(|_| limiter.check(CLIENT).is_ok()).count()
    }

    #[tokio::test(start_paused = true)]
    async fn thirty_first_request_is_limited() {
        let limiter = StatusRateLimiter::new(&RateLimitConfig::default());
        assert_eq!(accepted(&limiter, 30), 30);
        let err = limiter.check(CLIENT).unwrap_err();
        assert!(matches!(err, MonitorError::RateLimited { retry_after_secs: 60 }));

        // other clients have their own budget
        limiter.check("198.51.100.1").unwrap();
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn quota_does_not_refill_inside_the_window() {
        let limiter = StatusRateLimiter::new(&RateLimitConfig::default());
        assert_eq!(accepted(&limiter, 30), 30);

        advance(Duration::from_millis(4_100)).await;
        assert_eq!(accepted(&limiter, 5), 0);

        advance(Duration::from_secs(55)).await;
        let err = limiter.check(CLIENT).unwrap_err();
        assert!(matches!(err, MonitorError::RateLimited { retry_after_secs: 1 }));

        advance(Duration::from_secs(1)).await;
        assert_eq!(accepted(&limiter, 31), 30);
    }

    #[tokio::test(start_paused = true)]
    async fn window_slides_with_earlier_requests() {
        let limiter = StatusRateLimiter::new(&RateLimitConfig::default());
        assert_eq!(accepted(&limiter, 15), 15);
        advance(Duration::from_secs(30)).await;
        assert_eq!(accepted(&limiter, 20), 15);

        // the first fifteen leave the window, the later fifteen still count
        advance(Duration::from_secs(31)).await;
        assert_eq!(accepted(&limiter, 20), 15);
        let err = limiter.check(CLIENT).unwrap_err();
        assert!(matches!(err, MonitorError::RateLimited { retry_after_secs: 29 }));
    }

    #[tokio::test(start_paused = true)]
    async fn prune_drops_idle_clients() {
        let limiter = StatusRateLimiter::new(&RateLimitConfig::default());
        limiter.check(CLIENT).unwrap();
        advance(Duration::from_secs(30)).await;
        limiter.check("198.51.100.1").unwrap();

        advance(Duration::from_secs(31)).await;
        limiter.prune();
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn disabled_never_limits() {
        let limiter = StatusRateLimiter::new(&RateLimitConfig {
            enabled: false,
            requests_per_minute: 1,
        });
        for _ in 0..10 {
            limiter.check(CLIENT).unwrap();
        }
    }

    #[test]
    fn client_key_prefers_first_forwarded_hop() {
        let peer: SocketAddr = "10.0.0.5:4431".parse().unwrap();
        assert_eq!(client_key(Some("203.0.113.7, 10.0.0.1"), Some(peer)), "203.0.113.7");
        assert_eq!(client_key(Some(" "), Some(peer)), "10.0.0.5");
        assert_eq!(client_key(None, Some(peer)), "10.0.0.5");
        assert_eq!(client_key(None, None), "unknown");
    }
}
