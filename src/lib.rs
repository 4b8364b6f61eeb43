//! # weatherhub
//!
//! A weather-data aggregation node with:
//! - Lamport clocks on every message for a causal order of updates
//! - An ordered admission queue drained by a single apply worker
//! - TTL expiry of stations that stopped reporting
//! - Atomic whole-state snapshots, restored on startup
//!
//! ## Architecture
//!
//! ```text
//!  ┌─────────────┐  PUT  ┌─────────────────────────────────────┐
//!  │ Content src │──────▶│          Aggregation node           │
//!  └─────────────┘       │                                     │
//!  ┌─────────────┐  GET  │  dispatcher ──▶ admission queue     │
//!  │ Read client │◀─────▶│  (workers)      ordered (ts, id)    │
//!  └─────────────┘       │      │               │              │
//!                        │      │ read          ▼ apply         │
//!                        │      └────────▶ station store       │
//!                        │   expiry sweep ───▶  │              │
//!                        │                      ▼              │
//!                        │        snapshot (tmp + rename)      │
//!                        └─────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ### Start the node
//! ```bash
//! weatherhub-aggregation serve --bind 0.0.0.0:4567 --snapshot ./data.json
//! ```
//!
//! ### Push a station file
//! ```bash
//! weatherhub-content --server 127.0.0.1:4567 --file ./station.txt
//! ```
//!
//! ### Read a station
//! ```bash
//! weatherhub-client --server 127.0.0.1:4567 IDS60901
//! ```

pub mod aggregation;
pub mod client;
pub mod common;
pub mod content;
pub mod protocol;

// Re-export commonly used types
pub use aggregation::AggregationServer;
pub use common::{Config, Error, Result};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
