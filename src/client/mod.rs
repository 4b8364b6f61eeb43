//! Read client
//!
//! Fetches the latest document for one station, keeping its own Lamport
//! clock in step with the node. Connection and read failures are retried a
//! bounded number of times with a fixed delay.

use crate::common::{retry_fixed, ClientConfig, Error, LamportClock, Result};
use crate::protocol::{self, header, USER_AGENT};
use http::StatusCode;
use rand::Rng;
use serde_json::Value;

/// HTTP client for talking to one node: every exchange is bounded by
/// `timeout` and no connection is reused.
pub(crate) fn http_client(timeout: std::time::Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .pool_max_idle_per_host(0)
        .build()?)
}

pub struct GetClient {
    id: String,
    clock: LamportClock,
    config: ClientConfig,
    http: reqwest::Client,
}

impl GetClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let id = format!("client{}", rand::thread_rng().gen_range(0..100));
        Self::with_id(id, config)
    }

    pub fn with_id(id: impl Into<String>, config: ClientConfig) -> Result<Self> {
        Ok(Self {
            id: id.into(),
            clock: LamportClock::new(),
            http: http_client(config.request_timeout())?,
            config,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn clock(&self) -> &LamportClock {
        &self.clock
    }

    /// Latest document for `station_id`, or `None` if the node has none.
    pub async fn fetch(&self, station_id: &str) -> Result<Option<Value>> {
        retry_fixed(
            move || self.fetch_once(station_id),
            self.config.retries,
            self.config.retry_delay(),
        )
        .await
    }

    async fn fetch_once(&self, station_id: &str) -> Result<Option<Value>> {
        let response = self
            .http
            .get(protocol::url(&self.config.server_addr))
            .header(header::CLIENT_ID, self.id.as_str())
            .header(header::LAMPORT_CLOCK, self.clock.on_send())
            .header(header::STATION_ID, station_id)
            .send()
            .await?;

        let status = response.status();
        let lamport = self.clock.on_receive(protocol::lamport(response.headers())?);
        let body = response.bytes().await?;

        tracing::debug!(
            client = %self.id,
            %station_id,
            status = status.as_u16(),
            lamport,
            "read response"
        );

        match status {
            StatusCode::OK | StatusCode::CREATED => Ok(Some(serde_json::from_slice(&body)?)),
            StatusCode::INTERNAL_SERVER_ERROR => Ok(None),
            other => Err(Error::Other(format!(
                "node answered {} to read for {}",
                other, station_id
            ))),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::protocol::header;
    use bytes::Bytes;
    use http::{request, HeaderValue, Request, Response, StatusCode};
    use http_body_util::{BodyExt, Full};
    use hyper::body::Incoming;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper_util::rt::TokioIo;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    /// Answer one connection on `listener`, returning the request seen.
    pub(crate) async fn answer_once(
        listener: &TcpListener,
        status: StatusCode,
        lamport: u64,
        body: &'static [u8],
    ) -> (request::Parts, Bytes) {
        let (stream, _) = listener.accept().await.unwrap();
        let seen = Arc::new(Mutex::new(None));
        let slot = seen.clone();

        let service = service_fn(move |request: Request<Incoming>| {
            let slot = slot.clone();
            async move {
                let (parts, incoming) = request.into_parts();
                let received = incoming.collect().await?.to_bytes();
                *slot.lock().unwrap() = Some((parts, received));

                let mut response = Response::new(Full::new(Bytes::from_static(body)));
                *response.status_mut() = status;
                response
                    .headers_mut()
                    .insert(header::LAMPORT_CLOCK, HeaderValue::from(lamport));
                Ok::<_, hyper::Error>(response)
            }
        });

        http1::Builder::new()
            .keep_alive(false)
            .serve_connection(TokioIo::new(stream), service)
            .await
            .unwrap();
        let seen = seen.lock().unwrap().take();
        seen.unwrap()
    }
}
