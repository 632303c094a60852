//! Server assembly
//!
//! [`Server`] wires a [`Monitor`] over caller-supplied stores, so an
//! embedding workflow can hand in its own submission directory and
//! retryable operations, then serves the routes alongside the periodic
//! monitor tasks.

use crate::config::ServerConfig;
use crate::routes::routes;
use crate::state::AppState;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use subwatch_core::{Clock, SystemClock};
use subwatch_engine::{HealthProbe, Monitor, MonitorRuntime, MonitorStores, OperationRegistry};

/// How often idle rate-limit entries are dropped
const LIMITER_PRUNE_INTERVAL: Duration = Duration::from_secs(300);

/// A configured monitor ready to serve
#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    monitor: Arc<Monitor>,
}

impl Server {
    /// Wire a monitor on the wall clock
    #[must_use]
    pub fn new(
        config: ServerConfig,
        stores: MonitorStores,
        registry: OperationRegistry,
        probes: Vec<Arc<dyn HealthProbe>>,
    ) -> Self {
        Self::with_clock(config, stores, registry, probes, Arc::new(SystemClock))
    }

    /// Wire a monitor on a given clock
    #[must_use]
    pub fn with_clock(
        config: ServerConfig,
        stores: MonitorStores,
        registry: OperationRegistry,
        probes: Vec<Arc<dyn HealthProbe>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let monitor = Monitor::new(config.monitor.clone(), stores, registry, probes, clock);
        Self {
            config,
            monitor: Arc::new(monitor),
        }
    }

    /// The monitor the routes serve; workflows record progress through it
    #[must_use]
    pub fn monitor(&self) -> &Arc<Monitor> {
        &self.monitor
    }

    /// Bind the listener and start the periodic tasks
    ///
    /// Returns the bound address and a future that serves until `shutdown`
    /// resolves, then drains the periodic tasks.
    ///
    /// # Errors
    /// The configured address cannot be bound
    pub fn bind(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(SocketAddr, impl Future<Output = ()>), warp::Error> {
        let state = AppState::new(self.monitor.clone(), &self.config);
        let (addr, server) = warp::serve(routes(state.clone()))
            .try_bind_with_graceful_shutdown(self.config.bind, shutdown)?;

        let runtime = MonitorRuntime::start(self.monitor);
        let limiter = state.limiter.clone();
        let pruner = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(LIMITER_PRUNE_INTERVAL);
            loop {
                ticker.tick().await;
                limiter.prune();
            }
        });

        Ok((addr, async move {
            server.await;
            tracing::info!("HTTP server stopped, draining periodic tasks");
            pruner.abort();
            runtime.shutdown().await;
        }))
    }
}
