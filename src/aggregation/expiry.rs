//! Periodic TTL eviction
//!
//! Stations not touched by the apply loop within the TTL are removed
//! (record and last-touched time together). A sweep that removed anything
//! persists a new snapshot. Clients are not notified; later reads simply
//! miss.

use crate::aggregation::snapshot::SnapshotManager;
use crate::aggregation::stats::NodeStats;
use crate::aggregation::store::StationStore;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct ExpirySweeper {
    store: Arc<StationStore>,
    snapshots: Arc<SnapshotManager>,
    stats: Arc<NodeStats>,
    ttl: Duration,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(
        store: Arc<StationStore>,
        snapshots: Arc<SnapshotManager>,
        stats: Arc<NodeStats>,
        ttl: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            snapshots,
            stats,
            ttl,
            interval,
        }
    }

    pub fn sweep(&self) -> Vec<String> {
        self.sweep_at(Instant::now())
    }

    /// Evict stations last touched before `now - ttl`.
    pub fn sweep_at(&self, now: Instant) -> Vec<String> {
        let Some(cutoff) = now.checked_sub(self.ttl) else {
            return Vec::new();
        };

        let removed = self.store.remove_untouched_since(cutoff);
        if removed.is_empty() {
            return removed;
        }

        NodeStats::add(&self.stats.expired, removed.len() as u64);
        for station_id in &removed {
            tracing::info!(%station_id, "station expired");
        }
        tracing::info!(count = removed.len(), "removed expired stations");

        if let Err(e) = self.snapshots.persist() {
            tracing::warn!(error = %e, "snapshot not persisted after sweep");
        }
        removed
    }

    /// Run sweeps on a fixed period until the task is aborted.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + self.interval;
            let mut ticker = tokio::time::interval_at(start, self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                // Persisting touches the filesystem.
                let sweeper = self.clone();
                if let Err(e) = tokio::task::spawn_blocking(move || sweeper.sweep()).await {
                    tracing::error!(error = %e, "expiry sweep panicked");
                }
            }
        })
    }
}
