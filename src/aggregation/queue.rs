//! Ordered admission queue
//!
//! Producers (connection tasks) push writes concurrently; the single apply
//! worker pops them in ascending `(timestamp, station_id)` order. Items
//! sharing both keys leave in arrival order. The queue is unbounded.
//!
//! Closing the queue rejects further puts but lets the consumer drain what
//! is already admitted; `take` returns `None` once the queue is closed and
//! empty.

use crate::common::{Error, Result};
use serde_json::Value;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::net::SocketAddr;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Who sent a write and when it reached the node
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub request_id: Uuid,
    pub sender: Option<String>,
    pub peer: Option<SocketAddr>,
}

impl RequestMeta {
    pub fn new(sender: Option<String>, peer: Option<SocketAddr>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            sender,
            peer,
        }
    }
}

impl Default for RequestMeta {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// A write accepted by the node but not yet applied
#[derive(Debug, Clone)]
pub struct AdmissionRequest {
    pub station_id: String,
    pub payload: Value,
    /// Local clock value assigned on receipt
    pub timestamp: u64,
    pub meta: RequestMeta,
}

impl AdmissionRequest {
    pub fn new(station_id: String, payload: Value, timestamp: u64, meta: RequestMeta) -> Self {
        Self {
            station_id,
            payload,
            timestamp,
            meta,
        }
    }

    /// Apply-order key
    pub fn order_key(&self) -> (u64, &str) {
        (self.timestamp, &self.station_id)
    }
}

struct Pending {
    request: AdmissionRequest,
    arrival: u64,
}

impl Pending {
    fn key(&self) -> (u64, &str, u64) {
        (
            self.request.timestamp,
            &self.request.station_id,
            self.arrival,
        )
    }
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<Reverse<Pending>>,
    next_arrival: u64,
    closed: bool,
}

impl QueueState {
    fn push(&mut self, request: AdmissionRequest) {
        let arrival = self.next_arrival;
        self.next_arrival += 1;
        self.heap.push(Reverse(Pending { request, arrival }));
    }
}

/// Multi-producer, single-consumer priority queue
#[derive(Default)]
pub struct AdmissionQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

impl AdmissionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a write. Fails only after [`close`](Self::close).
    pub fn put(&self, request: AdmissionRequest) -> Result<()> {
        let mut state = self.lock();
        if state.closed {
            return Err(Error::Other("admission queue is closed".into()));
        }
        state.push(request);
        drop(state);

        self.available.notify_one();
        Ok(())
    }

    /// Stamp and admit a write as one step.
    ///
    /// `stamp` runs under the queue lock, so timestamps enter the heap in
    /// the order they were issued and the consumer never sees a smaller
    /// timestamp after a larger one. `stamp` runs even when the queue is
    /// closed. Returns the assigned timestamp.
    pub fn admit<S, B>(&self, stamp: S, build: B) -> Result<u64>
    where
        S: FnOnce() -> u64,
        B: FnOnce(u64) -> AdmissionRequest,
    {
        let mut state = self.lock();
        let timestamp = stamp();
        if state.closed {
            return Err(Error::Other("admission queue is closed".into()));
        }
        state.push(build(timestamp));
        drop(state);

        self.available.notify_one();
        Ok(timestamp)
    }

    /// Block until the smallest pending write is available.
    pub fn take(&self) -> Option<AdmissionRequest> {
        let mut state = self.lock();
        loop {
            if let Some(Reverse(pending)) = state.heap.pop() {
                return Some(pending.request);
            }
            if state.closed {
                return None;
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn try_take(&self) -> Option<AdmissionRequest> {
        self.lock().heap.pop().map(|Reverse(p)| p.request)
    }

    /// Stop admitting writes and wake the consumer so it can drain and exit.
    pub fn close(&self) {
        self.lock().closed = true;
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().heap.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;
    use crate::common::LamportClock;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn request(timestamp: u64, station_id: &str) -> AdmissionRequest {
        AdmissionRequest::new(
            station_id.to_string(),
            json!({ "id": station_id, "ts": timestamp }),
            timestamp,
            RequestMeta::default(),
        )
    }

    fn drain(queue: &AdmissionQueue) -> Vec<(u64, String)> {
        std::iter::from_fn(|| queue.try_take())
            .map(|r| (r.timestamp, r.station_id))
            .collect()
    }

    #[test]
    fn test_orders_by_timestamp_then_station() {
        let queue = AdmissionQueue::new();
        queue.put(request(5, "B")).unwrap();
        queue.put(request(2, "Z")).unwrap();
        queue.put(request(5, "A")).unwrap();
        queue.put(request(1, "M")).unwrap();

        assert_eq!(queue.len(), 4);
        assert_eq!(
            drain(&queue),
            vec![
                (1, "M".to_string()),
                (2, "Z".to_string()),
                (5, "A".to_string()),
                (5, "B".to_string()),
            ]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_identical_keys_keep_arrival_order() {
        let queue = AdmissionQueue::new();
        for n in 0..3 {
            let mut r = request(7, "S");
            r.payload = json!({ "id": "S", "n": n });
            queue.put(r).unwrap();
        }
        let order: Vec<_> = std::iter::from_fn(|| queue.try_take())
            .map(|r| r.payload["n"].as_i64().unwrap())
            .collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_same_order_for_any_arrival_permutation() {
        let mut input: Vec<(u64, String)> = (0..40)
            .map(|i| (i % 7, format!("IDS{:02}", (i * 13) % 11)))
            .collect();
        let mut expected = input.clone();
        expected.sort();

        let mut rng = rand::thread_rng();
        for _ in 0..5 {
            input.shuffle(&mut rng);
            let queue = AdmissionQueue::new();
            for (ts, id) in &input {
                queue.put(request(*ts, id)).unwrap();
            }
            assert_eq!(drain(&queue), expected);
        }
    }

    #[test]
    fn test_take_blocks_until_put() {
        let queue = Arc::new(AdmissionQueue::new());
        let consumer = {
            let queue = queue.clone();
            std::thread::spawn(move || queue.take())
        };

        std::thread::sleep(Duration::from_millis(50));
        queue.put(request(3, "S1")).unwrap();

        let taken = consumer.join().unwrap().unwrap();
        assert_eq!(taken.order_key(), (3, "S1"));
    }

    #[test]
    fn test_close_drains_then_ends() {
        let queue = AdmissionQueue::new();
        queue.put(request(2, "A")).unwrap();
        queue.close();

        assert!(queue.is_closed());
        assert!(queue.put(request(3, "B")).is_err());
        assert_eq!(queue.take().unwrap().station_id, "A");
        assert!(queue.take().is_none());
    }

    #[test]
    fn test_close_wakes_blocked_consumer() {
        let queue = Arc::new(AdmissionQueue::new());
        let consumer = {
            let queue = queue.clone();
            std::thread::spawn(move || queue.take())
        };

        std::thread::sleep(Duration::from_millis(50));
        queue.close();
        assert!(consumer.join().unwrap().is_none());
    }

    #[test]
    fn test_admit_stamps_under_lock() {
        let queue = AdmissionQueue::new();
        let clock = LamportClock::starting_at(9);
        let ts = queue.admit(|| clock.on_receive(4), |t| request(t, "S1")).unwrap();
        assert_eq!(ts, 10);
        assert_eq!(queue.try_take().unwrap().order_key(), (10, "S1"));

        // A closed queue still merges the sender's clock.
        queue.close();
        assert!(queue
            .admit(|| clock.on_receive(50), |t| request(t, "S1"))
            .is_err());
        assert_eq!(clock.get(), 51);
    }

    #[test]
    fn test_admitted_timestamps_leave_in_issue_order() {
        let queue = Arc::new(AdmissionQueue::new());
        let clock = Arc::new(LamportClock::new());

        let consumer = {
            let queue = queue.clone();
            std::thread::spawn(move || {
                std::iter::from_fn(|| queue.take())
                    .map(|r| r.timestamp)
                    .collect::<Vec<_>>()
            })
        };

        // Producers race on the same station while the consumer is live.
        let producers: Vec<_> = (0..8)
            .map(|_| {
                let queue = queue.clone();
                let clock = clock.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        queue
                            .admit(|| clock.on_receive(0), |t| request(t, "S"))
                            .unwrap();
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }
        queue.close();

        let taken = consumer.join().unwrap();
        assert_eq!(taken.len(), 4000);
        assert!(taken.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_concurrent_producers() {
        let queue = Arc::new(AdmissionQueue::new());
        let producers: Vec<_> = (0..8u64)
            .map(|p| {
                let queue = queue.clone();
                std::thread::spawn(move || {
                    for i in 0..100u64 {
                        queue
                            .put(request(i * 8 + p, &format!("S{}", p)))
                            .unwrap();
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }

        let drained = drain(&queue);
        assert_eq!(drained.len(), 800);
        assert!(drained.windows(2).all(|w| w[0] < w[1]));
    }
}
