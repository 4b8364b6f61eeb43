//! Content source: pushes one station document to the node

use crate::client::http_client;
use crate::common::{retry_fixed, ContentConfig, Error, LamportClock, Result};
use crate::content::ingest::read_station_file;
use crate::protocol::{self, header, JSON_CONTENT_TYPE};
use http::header::CONTENT_TYPE;
use http::StatusCode;
use rand::Rng;
use serde_json::Value;
use std::path::Path;

/// Result of one accepted push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushOutcome {
    pub status: StatusCode,
    /// Local clock after merging the node's reply
    pub lamport: u64,
}

pub struct ContentSource {
    id: String,
    clock: LamportClock,
    document: Value,
    config: ContentConfig,
    http: reqwest::Client,
}

impl ContentSource {
    /// `document` must be a JSON object with a non-empty `id`.
    pub fn new(document: Value, config: ContentConfig) -> Result<Self> {
        let id = format!("cs{}", rand::thread_rng().gen_range(0..100));
        Self::with_id(id, document, config)
    }

    pub fn with_id(id: impl Into<String>, document: Value, config: ContentConfig) -> Result<Self> {
        if crate::aggregation::station_id_of(&document).is_none() {
            return Err(Error::Ingest("document has no station id".into()));
        }
        Ok(Self {
            id: id.into(),
            clock: LamportClock::new(),
            document,
            http: http_client(config.request_timeout())?,
            config,
        })
    }

    pub fn from_file(path: impl AsRef<Path>, config: ContentConfig) -> Result<Self> {
        Self::new(read_station_file(path)?, config)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn clock(&self) -> &LamportClock {
        &self.clock
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Swap in a newer reading for the next push.
    pub fn replace_document(&mut self, document: Value) -> Result<()> {
        if crate::aggregation::station_id_of(&document).is_none() {
            return Err(Error::Ingest("document has no station id".into()));
        }
        self.document = document;
        Ok(())
    }

    /// Send the current document, retrying connection and read failures.
    pub async fn push(&self) -> Result<PushOutcome> {
        let body = serde_json::to_vec(&self.document)?;
        retry_fixed(
            || self.push_once(body.clone()),
            self.config.retries,
            self.config.retry_delay(),
        )
        .await
    }

    async fn push_once(&self, body: Vec<u8>) -> Result<PushOutcome> {
        let response = self
            .http
            .put(protocol::url(&self.config.server_addr))
            .header(header::SERVER_ID, self.id.as_str())
            .header(header::LAMPORT_CLOCK, self.clock.on_send())
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .body(body)
            .send()
            .await?;
        let status = response.status();
        let lamport = self.clock.on_receive(protocol::lamport(response.headers())?);

        tracing::debug!(
            source = %self.id,
            status = status.as_u16(),
            lamport,
            "push acknowledged"
        );

        Ok(PushOutcome { status, lamport })
    }
}
