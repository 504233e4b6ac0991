//! Periodic routing table logging.

use std::sync::Arc;
use std::time::Duration;

use meshlite_tasks::Shutdown;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::config::DEFAULT_WATCH_INTERVAL;
use crate::ports::{RoutingTable, RoutingTableSnapshot};

/// Logs a [`RoutingTableSnapshot`] every interval. Read-only.
pub struct RoutingTableWatcher<R> {
    routing: Arc<R>,
    interval: Duration,
}

impl<R: RoutingTable> RoutingTableWatcher<R> {
    pub fn new(routing: Arc<R>) -> Self {
        Self {
            routing,
            interval: DEFAULT_WATCH_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub async fn tick(&self) -> RoutingTableSnapshot {
        let snapshot = RoutingTableSnapshot::capture(&*self.routing).await;
        metrics::gauge!("overlay.routing.size").set(snapshot.size as f64);
        snapshot.log();
        snapshot
    }

    /// First snapshot one interval after start, then every interval until shutdown.
    pub async fn run(self, mut shutdown: Shutdown) {
        let period = self.interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    debug!("routing table watcher received shutdown signal");
                    break;
                }

                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }
}
