//! Connection dispatcher
//!
//! One request per connection, served by hyper's HTTP/1 connection driver.
//! Every inbound message is merged into the clock exactly once before it is
//! queued or served, and every reply carries a fresh `on_send` value taken
//! after that merge.
//!
//! Writes are acknowledged once admitted to the queue, not once applied;
//! a concurrent read may briefly miss an acknowledged write. Reads go
//! straight to the store and never wait behind queued writes.

use crate::aggregation::queue::{AdmissionQueue, AdmissionRequest, RequestMeta};
use crate::aggregation::stats::NodeStats;
use crate::aggregation::store::{station_id_of, StationStore};
use crate::common::{Error, LamportClock, NodeConfig, Result};
use crate::protocol::{self, header, JSON_CONTENT_TYPE};
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

pub struct Dispatcher {
    clock: Arc<LamportClock>,
    store: Arc<StationStore>,
    queue: Arc<AdmissionQueue>,
    stats: Arc<NodeStats>,
    read_timeout: Duration,
    max_body: usize,
}

impl Dispatcher {
    pub fn new(
        clock: Arc<LamportClock>,
        store: Arc<StationStore>,
        queue: Arc<AdmissionQueue>,
        stats: Arc<NodeStats>,
        config: &NodeConfig,
    ) -> Self {
        Self {
            clock,
            store,
            queue,
            stats,
            read_timeout: config.read_timeout(),
            max_body: config.max_body_bytes,
        }
    }

    /// Serve one request on `io`, then close it.
    ///
    /// Headers and body must each arrive within the read timeout. A body
    /// that is late, oversized or unreadable drops the connection without a
    /// reply.
    pub async fn serve_connection<I>(self: Arc<Self>, io: I, peer: Option<SocketAddr>) -> Result<()>
    where
        I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let read_timeout = self.read_timeout;
        let service = service_fn(move |request: Request<Incoming>| {
            let dispatcher = self.clone();
            async move { dispatcher.handle(request, peer).await }
        });

        http1::Builder::new()
            .timer(TokioTimer::new())
            .header_read_timeout(read_timeout)
            .keep_alive(false)
            .serve_connection(TokioIo::new(io), service)
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(format!("no request within {:?}", read_timeout))
                } else {
                    Error::Connection(e.to_string())
                }
            })
    }

    async fn handle(
        &self,
        request: Request<Incoming>,
        peer: Option<SocketAddr>,
    ) -> Result<Response<Full<Bytes>>> {
        let (parts, body) = request.into_parts();
        let collected = tokio::time::timeout(
            self.read_timeout,
            Limited::new(body, self.max_body).collect(),
        )
        .await;

        let body = match collected {
            Ok(Ok(collected)) => collected.to_bytes(),
            Ok(Err(e)) => {
                tracing::warn!(?peer, error = %e, "unreadable request body");
                return Err(Error::Protocol(format!("unreadable body: {}", e)));
            }
            Err(_) => {
                tracing::warn!(?peer, "request body timed out");
                return Err(Error::Timeout(format!(
                    "body not received within {:?}",
                    self.read_timeout
                )));
            }
        };

        Ok(self.handle_request(Request::from_parts(parts, body), peer))
    }

    /// Serve one fully received request.
    pub fn handle_request(
        &self,
        request: Request<Bytes>,
        peer: Option<SocketAddr>,
    ) -> Response<Full<Bytes>> {
        let remote = match protocol::lamport(request.headers()) {
            Ok(t) => t,
            Err(e) => return self.reject(None, e),
        };

        if *request.method() == Method::PUT {
            self.handle_put(&request, remote, peer)
        } else if *request.method() == Method::GET {
            self.handle_get(&request, remote)
        } else {
            let e = Error::Protocol(format!("unsupported verb {}", request.method()));
            self.reject(Some(remote), e)
        }
    }

    fn handle_put(
        &self,
        request: &Request<Bytes>,
        remote: u64,
        peer: Option<SocketAddr>,
    ) -> Response<Full<Bytes>> {
        let payload: Value = match serde_json::from_slice(request.body()) {
            Ok(v) => v,
            Err(e) => {
                return self.reject(Some(remote), Error::Protocol(format!("invalid body: {}", e)))
            }
        };
        if !payload.is_object() {
            return self.reject(
                Some(remote),
                Error::Protocol("body is not a JSON object".into()),
            );
        }
        let Some(station_id) = station_id_of(&payload) else {
            return self.reject(Some(remote), Error::Protocol("body has no station id".into()));
        };

        let existed = self.store.contains(&station_id);
        let sender = protocol::header_str(request.headers(), &header::SERVER_ID).map(str::to_string);
        let meta = RequestMeta::new(sender, peer);
        let request_id = meta.request_id;
        let log_id = station_id.clone();

        // The merge happens inside the queue's critical section so that
        // admission timestamps enter the queue in issue order.
        let admitted = self.queue.admit(
            || self.clock.on_receive(remote),
            move |timestamp| AdmissionRequest::new(station_id, payload, timestamp, meta),
        );
        let timestamp = match admitted {
            Ok(timestamp) => timestamp,
            Err(e) => {
                tracing::warn!(station_id = %log_id, error = %e, "write not admitted");
                return reply(e.to_status(), self.clock.on_send(), Bytes::new());
            }
        };
        NodeStats::incr(&self.stats.writes_admitted);
        NodeStats::raise(&self.stats.max_admitted, timestamp);

        tracing::debug!(
            station_id = %log_id,
            remote_lamport = remote,
            lamport = timestamp,
            %request_id,
            "admitted write"
        );

        let status = if existed {
            StatusCode::OK
        } else {
            StatusCode::CREATED
        };
        reply(status, self.clock.on_send(), Bytes::new())
    }

    fn handle_get(&self, request: &Request<Bytes>, remote: u64) -> Response<Full<Bytes>> {
        let Some(station_id) = protocol::header_str(request.headers(), &header::STATION_ID) else {
            let e = Error::Protocol(format!("missing {} header", header::STATION_ID));
            return self.reject(Some(remote), e);
        };

        let lamport = self.clock.on_receive(remote);
        let client = protocol::header_str(request.headers(), &header::CLIENT_ID).unwrap_or("unknown");

        match self.lookup(station_id) {
            Ok(body) => {
                NodeStats::incr(&self.stats.reads_served);
                tracing::debug!(%station_id, client, lamport, "served read");
                reply(StatusCode::OK, self.clock.on_send(), body)
            }
            Err(e) => {
                NodeStats::incr(&self.stats.reads_missed);
                tracing::info!(%station_id, client, lamport, error = %e, "read miss");
                reply(e.to_status(), self.clock.on_send(), Bytes::new())
            }
        }
    }

    fn lookup(&self, station_id: &str) -> Result<Bytes> {
        if self.store.is_empty() {
            return Err(Error::NotFound("no stations stored".into()));
        }
        let record = self
            .store
            .get(station_id)
            .ok_or_else(|| Error::NotFound(station_id.to_string()))?;
        Ok(Bytes::from(serde_json::to_vec(&record.payload)?))
    }

    fn reject(&self, remote: Option<u64>, error: Error) -> Response<Full<Bytes>> {
        if let Some(remote) = remote {
            self.clock.on_receive(remote);
        }
        NodeStats::incr(&self.stats.bad_requests);
        tracing::warn!(error = %error, "bad request");
        reply(error.to_status(), self.clock.on_send(), Bytes::new())
    }
}

fn reply(status: StatusCode, lamport: u64, body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
    headers.insert(header::LAMPORT_CLOCK, HeaderValue::from(lamport));
    response
}
