//! Aggregation node

use crate::aggregation::apply::ApplyLoop;
use crate::aggregation::dispatcher::Dispatcher;
use crate::aggregation::expiry::ExpirySweeper;
use crate::aggregation::queue::AdmissionQueue;
use crate::aggregation::snapshot::{RestoreOutcome, SnapshotManager};
use crate::aggregation::stats::NodeStats;
use crate::aggregation::store::StationStore;
use crate::common::{Error, LamportClock, NodeConfig, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;

pub struct AggregationServer {
    config: NodeConfig,
    clock: Arc<LamportClock>,
    store: Arc<StationStore>,
    queue: Arc<AdmissionQueue>,
    stats: Arc<NodeStats>,
    snapshots: Arc<SnapshotManager>,
    restored: RestoreOutcome,
}

impl AggregationServer {
    /// Build the node's shared state and restore the last snapshot.
    pub fn open(config: NodeConfig) -> Result<Self> {
        config.validate()?;

        let clock = Arc::new(LamportClock::new());
        let store = Arc::new(StationStore::new());
        let queue = Arc::new(AdmissionQueue::new());
        let stats = Arc::new(NodeStats::new());
        let snapshots = Arc::new(SnapshotManager::new(
            config.snapshot_path.clone(),
            clock.clone(),
            store.clone(),
            stats.clone(),
        ));

        let restored = snapshots.restore_or_cold_start();

        Ok(Self {
            config,
            clock,
            store,
            queue,
            stats,
            snapshots,
            restored,
        })
    }

    pub fn clock(&self) -> Arc<LamportClock> {
        self.clock.clone()
    }

    pub fn store(&self) -> Arc<StationStore> {
        self.store.clone()
    }

    pub fn stats(&self) -> Arc<NodeStats> {
        self.stats.clone()
    }

    pub fn restored(&self) -> RestoreOutcome {
        self.restored
    }

    /// Bind the configured address and run until Ctrl-C.
    pub async fn serve(self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.run_until(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "failed to install ctrl-c handler");
            }
        })
        .await
    }

    /// Accept connections on `listener` until `shutdown` resolves, then
    /// drain and stop.
    pub async fn run_until<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        tracing::info!("Starting aggregation node");
        tracing::info!("  Listening on: {}", listener.local_addr()?);
        tracing::info!("  Snapshot path: {}", self.config.snapshot_path.display());
        tracing::info!("  Workers: {}", self.config.workers);
        tracing::info!(
            "  TTL: {:?} (sweep every {:?})",
            self.config.ttl(),
            self.config.sweep_interval()
        );

        let apply = ApplyLoop::new(
            self.queue.clone(),
            self.store.clone(),
            self.snapshots.clone(),
            self.stats.clone(),
        );
        let apply_state = apply.state_handle();
        let apply_handle = tokio::task::spawn_blocking(move || apply.run());

        let sweeper = Arc::new(ExpirySweeper::new(
            self.store.clone(),
            self.snapshots.clone(),
            self.stats.clone(),
            self.config.ttl(),
            self.config.sweep_interval(),
        ));
        let sweep_handle = sweeper.spawn();

        let dispatcher = Arc::new(Dispatcher::new(
            self.clock.clone(),
            self.store.clone(),
            self.queue.clone(),
            self.stats.clone(),
            &self.config,
        ));

        let workers = self.config.workers;
        let permits = Arc::new(Semaphore::new(workers));
        tokio::pin!(shutdown);

        tracing::info!("✓ Aggregation node ready");

        loop {
            // A free worker slot first, then a connection for it.
            let permit = tokio::select! {
                _ = &mut shutdown => break,
                permit = permits.clone().acquire_owned() => {
                    permit.map_err(|e| Error::Other(format!("worker pool closed: {}", e)))?
                }
            };

            tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let dispatcher = dispatcher.clone();
                        tokio::spawn(async move {
                            let _permit = permit;
                            if let Err(e) = dispatcher.serve_connection(stream, Some(peer)).await {
                                tracing::warn!(%peer, error = %e, "connection closed with error");
                            }
                        });
                    }
                    Err(e) => tracing::warn!(error = %e, "failed to accept connection"),
                }
            }
        }

        drop(listener);
        tracing::info!("Shutting down aggregation node");

        let grace = self.config.shutdown_grace();
        let all_workers = u32::try_from(workers).unwrap_or(u32::MAX);
        if tokio::time::timeout(grace, permits.acquire_many(all_workers))
            .await
            .is_err()
        {
            tracing::warn!("connections still open after {:?}, not waiting", grace);
        }

        // Admitted writes are applied before the worker exits.
        self.queue.close();
        match tokio::time::timeout(grace, apply_handle).await {
            Ok(Ok(applied)) => tracing::info!(applied, "apply loop drained"),
            Ok(Err(e)) => tracing::error!(error = %e, "apply loop panicked"),
            Err(_) => tracing::warn!(
                pending = self.queue.len(),
                state = ?apply_state.get(),
                "apply loop did not drain within {:?}",
                grace
            ),
        }

        sweep_handle.abort();

        let snapshots = self.snapshots.clone();
        match tokio::task::spawn_blocking(move || snapshots.persist()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "final snapshot failed"),
            Err(e) => tracing::error!(error = %e, "final snapshot panicked"),
        }

        tracing::info!(stats = ?self.stats.snapshot(), "aggregation node stopped");
        Ok(())
    }
}
