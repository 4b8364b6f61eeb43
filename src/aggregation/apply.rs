//! Apply loop: the only writer that inserts or replaces station records
//!
//! `Waiting -> Applying -> Persisting -> Waiting`, until the admission
//! queue is closed and drained. The queue hands out writes in
//! `(timestamp, station_id)` order, so overwriting unconditionally gives
//! last-write-wins under that order.

use crate::aggregation::queue::{AdmissionQueue, AdmissionRequest};
use crate::aggregation::snapshot::SnapshotManager;
use crate::aggregation::stats::NodeStats;
use crate::aggregation::store::{StationStore, WeatherRecord};
use crate::common::{Error, Result};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyState {
    Waiting,
    Applying,
    Persisting,
}

impl ApplyState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ApplyState::Applying,
            2 => ApplyState::Persisting,
            _ => ApplyState::Waiting,
        }
    }
}

pub struct ApplyLoop {
    queue: Arc<AdmissionQueue>,
    store: Arc<StationStore>,
    snapshots: Arc<SnapshotManager>,
    stats: Arc<NodeStats>,
    state: Arc<AtomicU8>,
}

impl ApplyLoop {
    pub fn new(
        queue: Arc<AdmissionQueue>,
        store: Arc<StationStore>,
        snapshots: Arc<SnapshotManager>,
        stats: Arc<NodeStats>,
    ) -> Self {
        Self {
            queue,
            store,
            snapshots,
            stats,
            state: Arc::new(AtomicU8::new(ApplyState::Waiting as u8)),
        }
    }

    /// Handle for observing the loop's state from another thread.
    pub fn state_handle(&self) -> ApplyStateHandle {
        ApplyStateHandle(self.state.clone())
    }

    /// Run until the queue is closed and empty. Blocks the calling thread.
    /// Returns the number of writes applied.
    pub fn run(self) -> u64 {
        tracing::info!("apply loop started");
        let mut applied = 0;

        loop {
            self.set_state(ApplyState::Waiting);
            let Some(request) = self.queue.take() else {
                break;
            };

            self.set_state(ApplyState::Applying);
            let station_id = request.station_id.clone();
            let timestamp = request.timestamp;
            if let Err(e) = self.apply_one(request) {
                NodeStats::incr(&self.stats.apply_failures);
                tracing::error!(%station_id, lamport = timestamp, error = %e, "failed to apply write");
                continue;
            }
            applied += 1;

            self.set_state(ApplyState::Persisting);
            if let Err(e) = self.snapshots.persist() {
                tracing::warn!(error = %e, "snapshot not persisted, retrying on next change");
            }
        }

        self.set_state(ApplyState::Waiting);
        tracing::info!(applied, "apply loop stopped");
        applied
    }

    /// Apply a single admitted write to the store.
    pub fn apply_one(&self, request: AdmissionRequest) -> Result<()> {
        if request.station_id.is_empty() {
            return Err(Error::Other("empty station id".into()));
        }
        if !request.payload.is_object() {
            return Err(Error::Other(format!(
                "payload for {} is not a JSON object",
                request.station_id
            )));
        }

        let created = self.store.upsert(
            request.station_id.clone(),
            WeatherRecord::new(request.payload, request.timestamp),
            Instant::now(),
        );
        NodeStats::incr(&self.stats.applied);

        tracing::debug!(
            station_id = %request.station_id,
            lamport = request.timestamp,
            request_id = %request.meta.request_id,
            created,
            "applied write"
        );
        Ok(())
    }

    fn set_state(&self, state: ApplyState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

#[derive(Debug, Clone)]
pub struct ApplyStateHandle(Arc<AtomicU8>);

impl ApplyStateHandle {
    pub fn get(&self) -> ApplyState {
        ApplyState::from_u8(self.0.load(Ordering::Acquire))
    }
}
