//! Periodic task runtime
//!
//! Runs the stale sweep, retry cycle, health probes and optional cache
//! warming on fixed intervals. All loops share one `watch` shutdown channel;
//! a loop finishes its current cycle before exiting, and the retry cycle
//! releases any claim it is holding.

use crate::monitor::Monitor;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Handle to the running periodic tasks
#[derive(Debug)]
pub struct MonitorRuntime {
    shutdown: watch::Sender<bool>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl MonitorRuntime {
    /// Spawn every periodic task for `monitor`
    #[must_use]
    pub fn start(monitor: Arc<Monitor>) -> Self {
        let (shutdown, rx) = watch::channel(false);
        let config = monitor.config().clone();
        let mut tasks = Vec::new();

        let m = monitor.clone();
        tasks.push((
            "stale-sweep",
            spawn_periodic("stale-sweep", secs(config.stale.sweep_interval_secs), rx.clone(), move |_| {
                let m = m.clone();
                async move {
                    if let Err(e) = m.stale.run_once().await {
                        tracing::error!("Stale sweep failed: {}", e);
                    }
                }
            }),
        ));

        let m = monitor.clone();
        tasks.push((
            "retry-cycle",
            spawn_periodic("retry-cycle", secs(config.retry.poll_interval_secs), rx.clone(), move |shutdown| {
                let m = m.clone();
                async move {
                    if let Err(e) = m.retries.run_once(&shutdown).await {
                        tracing::error!("Retry cycle failed: {}", e);
                    }
                }
            }),
        ));

        let m = monitor.clone();
        tasks.push((
            "health-probe",
            spawn_periodic("health-probe", secs(config.health.interval_secs), rx.clone(), move |_| {
                let m = m.clone();
                async move {
                    if let Err(e) = m.health.run_once().await {
                        tracing::error!("Health cycle failed: {}", e);
                    }
                }
            }),
        ));

        if let Some(warm_secs) = config.analytics.warm_interval_secs {
            let m = monitor;
            tasks.push((
                "cache-warm",
                spawn_periodic("cache-warm", secs(warm_secs), rx, move |_| {
                    let m = m.clone();
                    async move {
                        if let Err(e) = m.analytics.warm().await {
                            tracing::warn!("Cache warming failed: {}", e);
                        }
                    }
                }),
            ));
        }

        tracing::info!("Monitor runtime started with {} periodic tasks", tasks.len());
        Self { shutdown, tasks }
    }

    /// Names of the running tasks
    #[must_use]
    pub fn task_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|(name, _)| *name).collect()
    }

    /// Signal shutdown and wait for every task to finish its current cycle
    pub async fn shutdown(self) {
        // receivers live in the tasks; an error only means they already exited
        let _ = self.shutdown.send(true);
        for (name, handle) in self.tasks {
            if let Err(e) = handle.await {
                tracing::error!("Periodic task {} ended abnormally: {}", name, e);
            }
        }
        tracing::info!("Monitor runtime stopped");
    }
}

fn secs(n: u64) -> Duration {
    Duration::from_secs(n.max(1))
}

fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut cycle: F,
) -> JoinHandle<()>
where
    F: FnMut(watch::Receiver<bool>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::debug!("{} running every {}s", name, period.as_secs());

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if *shutdown.borrow() {
                        break;
                    }
                    cycle(shutdown.clone()).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("{} stopped", name);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use subwatch_core::MonitorConfig;

    #[tokio::test(start_paused = true)]
    async fn starts_and_stops_all_tasks() {
        let config: MonitorConfig = MonitorConfig::new();
        let (monitor, _) = Monitor::in_memory(config);
        let runtime = MonitorRuntime::start(Arc::new(monitor));
        assert_eq!(runtime.task_names(), vec!["stale-sweep", "retry-cycle", "health-probe"]);

        tokio::time::sleep(Duration::from_secs(61)).await;
        runtime.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn probes_on_interval() {
        let mut config = MonitorConfig::new();
        config.health.interval_secs = 10;
        config.analytics.warm_interval_secs = Some(30);
        let (monitor, _) = Monitor::in_memory(config);
        let monitor = Arc::new(monitor);
        let runtime = MonitorRuntime::start(monitor.clone());
        assert_eq!(runtime.task_names().len(), 4);

        // first tick fires immediately, then every 10s
        tokio::time::sleep(Duration::from_secs(25)).await;
        runtime.shutdown().await;

        let history = monitor
            .health
            .history(None, subwatch_core::Pagination::default())
            .await
            .unwrap();
        assert_eq!(history.total, 3);
    }
}
