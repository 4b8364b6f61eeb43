//! Common utilities and types shared across weatherhub

pub mod clock;
pub mod config;
pub mod error;
pub mod utils;

pub use clock::LamportClock;
pub use config::{ClientConfig, Config, ContentConfig, NodeConfig};
pub use error::{Error, Result};
pub use utils::{parse_duration, retry_fixed};
