//! Content source
//!
//! Turns a flat station file into a JSON document and pushes it to the
//! aggregation node with Lamport-stamped PUT requests.

pub mod ingest;
pub mod source;

pub use ingest::{parse_station_text, read_station_file};
pub use source::{ContentSource, PushOutcome};
