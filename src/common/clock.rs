//! Lamport logical clock
//!
//! One clock per process, shared by reference between every component.
//! All operations are single atomic read-modify-write steps; none of them
//! block.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct LamportClock {
    counter: AtomicU64,
}

impl LamportClock {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    /// Start from a known value (used by tests and collaborators).
    pub fn starting_at(value: u64) -> Self {
        Self {
            counter: AtomicU64::new(value),
        }
    }

    /// Advance before transmitting a message; returns the new value.
    pub fn on_send(&self) -> u64 {
        self.update(|local| local.saturating_add(1))
    }

    /// Fold a peer's timestamp into local time: `max(local, remote) + 1`.
    pub fn on_receive(&self, remote: u64) -> u64 {
        self.update(|local| local.max(remote).saturating_add(1))
    }

    /// Current value, no side effect.
    pub fn get(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }

    /// Merge a persisted value at startup. Never moves the clock backwards.
    pub fn restore(&self, persisted: u64) -> u64 {
        self.update(|local| local.max(persisted))
    }

    fn update(&self, f: impl Fn(u64) -> u64) -> u64 {
        // The closure always returns Some, so fetch_update cannot fail.
        match self
            .counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| Some(f(v)))
        {
            Ok(prev) | Err(prev) => f(prev),
        }
    }
}
