//! Aggregation node
//!
//! Consistency and durability engine:
//! - Lamport-synchronised request intake on a bounded pool of connections
//! - Ordered admission queue feeding a single apply worker
//! - TTL eviction of stations that stopped reporting
//! - Atomic whole-state snapshots, restored on startup

pub mod apply;
pub mod dispatcher;
pub mod expiry;
pub mod queue;
pub mod server;
pub mod snapshot;
pub mod stats;
pub mod store;

pub use apply::{ApplyLoop, ApplyState, ApplyStateHandle};
pub use dispatcher::Dispatcher;
pub use expiry::ExpirySweeper;
pub use queue::{AdmissionQueue, AdmissionRequest, RequestMeta};
pub use server::AggregationServer;
pub use snapshot::{RestoreOutcome, Snapshot, SnapshotManager};
pub use stats::{NodeStats, StatsSnapshot};
pub use store::{station_id_of, StationStore, WeatherRecord};
