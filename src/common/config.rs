//! Configuration for weatherhub components
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `WEATHERHUB__`-prefixed environment variables (e.g.
//! `WEATHERHUB__NODE__TTL_SECS=60`). The binaries apply CLI flags last.

use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "WEATHERHUB";

/// Global configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Aggregation node
    #[serde(default)]
    pub node: NodeConfig,

    /// Content source (writer side)
    #[serde(default)]
    pub content: ContentConfig,

    /// Read client
    #[serde(default)]
    pub client: ClientConfig,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Aggregation node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Listen address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Canonical snapshot file
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,

    /// Connections handled concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Stations untouched for longer than this are evicted
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,

    /// Period of the expiry sweep
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Upper bound for reading one request
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,

    /// Largest accepted request body
    #[serde(default = "default_max_body")]
    pub max_body_bytes: usize,

    /// Drain deadline for connections and the apply worker on shutdown
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_ms: u64,
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 4567))
}
fn default_snapshot_path() -> PathBuf {
    PathBuf::from("data.json")
}
fn default_workers() -> usize {
    4
}
fn default_ttl() -> u64 {
    30
}
fn default_sweep_interval() -> u64 {
    10
}
fn default_read_timeout() -> u64 {
    10_000
}
fn default_max_body() -> usize {
    1024 * 1024
}
fn default_shutdown_grace() -> u64 {
    5_000
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            snapshot_path: default_snapshot_path(),
            workers: default_workers(),
            ttl_secs: default_ttl(),
            sweep_interval_secs: default_sweep_interval(),
            read_timeout_ms: default_read_timeout(),
            max_body_bytes: default_max_body(),
            shutdown_grace_ms: default_shutdown_grace(),
        }
    }
}

impl NodeConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::InvalidConfig("workers must be at least 1".into()));
        }
        if self.ttl_secs == 0 {
            return Err(Error::InvalidConfig("ttl_secs must be positive".into()));
        }
        if self.sweep_interval_secs == 0 {
            return Err(Error::InvalidConfig(
                "sweep_interval_secs must be positive".into(),
            ));
        }
        if self.max_body_bytes == 0 {
            return Err(Error::InvalidConfig(
                "max_body_bytes must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Content source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    /// Aggregation node address (host:port)
    #[serde(default = "default_server_addr")]
    pub server_addr: String,

    /// Period between two pushes
    #[serde(default = "default_push_interval")]
    pub push_interval_secs: u64,

    #[serde(default = "default_retries")]
    pub retries: usize,

    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    /// Upper bound for one request/reply exchange
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_server_addr() -> String {
    "127.0.0.1:4567".to_string()
}
fn default_push_interval() -> u64 {
    20
}
fn default_retries() -> usize {
    3
}
fn default_retry_delay() -> u64 {
    10_000
}
fn default_request_timeout() -> u64 {
    10_000
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            server_addr: default_server_addr(),
            push_interval_secs: default_push_interval(),
            retries: default_retries(),
            retry_delay_ms: default_retry_delay(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

impl ContentConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.retries == 0 {
            return Err(Error::InvalidConfig("retries must be at least 1".into()));
        }
        if self.push_interval_secs == 0 {
            return Err(Error::InvalidConfig(
                "push_interval_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Read client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_server_addr")]
    pub server_addr: String,

    #[serde(default = "default_retries")]
    pub retries: usize,

    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: default_server_addr(),
            retries: default_retries(),
            retry_delay_ms: default_retry_delay(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

impl ClientConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.retries == 0 {
            return Err(Error::InvalidConfig("retries must be at least 1".into()));
        }
        Ok(())
    }
}

impl Config {
    /// Load defaults, then the optional file, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
