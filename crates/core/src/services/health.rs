//! Periodic store health probe, independent of ingestion progress.
//!
//! The monitor runs on its own timer and never blocks or is blocked by
//! the scraper. Its output is a boolean watch channel that downstream
//! consumers (e.g., a readiness check) observe; sustained `false` is the
//! externally visible indicator of store failure.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::ports::Repositories;

/// Default probe cadence.
pub const HEALTH_PROBE_INTERVAL: Duration = Duration::from_secs(5);

/// Fixed-interval store reachability probe.
pub struct HealthMonitor<R: Repositories> {
    repos: Arc<R>,
    interval: Duration,
}

impl<R: Repositories> HealthMonitor<R> {
    pub fn new(repos: Arc<R>, interval: Duration) -> Self {
        Self { repos, interval }
    }

    /// Probe the store until shutdown, publishing each result on
    /// `liveness_tx`. Transitions are logged; steady states are not.
    #[instrument(skip_all)]
    pub async fn run(
        &self,
        liveness_tx: watch::Sender<bool>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let healthy = self.repos.is_healthy().await;
                    let was_healthy = *liveness_tx.borrow();
                    if healthy != was_healthy {
                        if healthy {
                            info!("💚 Store healthy");
                        } else {
                            warn!("⚠️  Store unreachable");
                        }
                    }
                    let _ = liveness_tx.send(healthy);
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        debug!("Health monitor stopping");
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testkit::MemoryRepositories;

    #[tokio::test]
    async fn publishes_health_transitions() {
        let repos = Arc::new(MemoryRepositories::new());
        let monitor = HealthMonitor::new(repos.clone(), Duration::from_millis(5));

        let (liveness_tx, mut liveness_rx) = watch::channel(true);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move { monitor.run(liveness_tx, shutdown_rx).await });

        repos.set_healthy(false);
        loop {
            liveness_rx.changed().await.unwrap();
            if !*liveness_rx.borrow() {
                break;
            }
        }

        repos.set_healthy(true);
        loop {
            liveness_rx.changed().await.unwrap();
            if *liveness_rx.borrow() {
                break;
            }
        }

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
