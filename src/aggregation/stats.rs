//! Node counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct NodeStats {
    pub writes_admitted: AtomicU64,
    pub reads_served: AtomicU64,
    pub reads_missed: AtomicU64,
    pub bad_requests: AtomicU64,
    pub applied: AtomicU64,
    pub apply_failures: AtomicU64,
    pub persists: AtomicU64,
    pub persist_failures: AtomicU64,
    pub expired: AtomicU64,
    /// Highest admission timestamp handed out
    pub max_admitted: AtomicU64,
}

/// Point-in-time copy of [`NodeStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub writes_admitted: u64,
    pub reads_served: u64,
    pub reads_missed: u64,
    pub bad_requests: u64,
    pub applied: u64,
    pub apply_failures: u64,
    pub persists: u64,
    pub persist_failures: u64,
    pub expired: u64,
    pub max_admitted: u64,
}

impl NodeStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn raise(counter: &AtomicU64, value: u64) {
        counter.fetch_max(value, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            writes_admitted: load(&self.writes_admitted),
            reads_served: load(&self.reads_served),
            reads_missed: load(&self.reads_missed),
            bad_requests: load(&self.bad_requests),
            applied: load(&self.applied),
            apply_failures: load(&self.apply_failures),
            persists: load(&self.persists),
            persist_failures: load(&self.persist_failures),
            expired: load(&self.expired),
            max_admitted: load(&self.max_admitted),
        }
    }
}
