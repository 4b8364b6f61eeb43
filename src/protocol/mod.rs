//! Wire vocabulary shared by the aggregation node and its peers
//!
//! Messages are plain HTTP/1.1, one request per connection:
//! ```text
//! PUT /weather.json HTTP/1.1
//! ServerId: cs12
//! LamportClock: 3
//! Content-Type: application/json
//! Content-Length: 35
//!
//! {"id":"IDS60901","air_temp":"13.3"}
//! ```
//! Reads are `GET` with `ClientId`, `LamportClock` and `StationId` headers.
//! Every response carries the node's clock in `LamportClock`.

use crate::common::{Error, Result};
use http::header::{HeaderMap, HeaderName};

pub const TARGET: &str = "/weather.json";
pub const USER_AGENT: &str = concat!("weatherhub/", env!("CARGO_PKG_VERSION"));
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Protocol header names (matched case-insensitively)
pub mod header {
    use http::header::HeaderName;

    pub const LAMPORT_CLOCK: HeaderName = HeaderName::from_static("lamportclock");
    pub const SERVER_ID: HeaderName = HeaderName::from_static("serverid");
    pub const CLIENT_ID: HeaderName = HeaderName::from_static("clientid");
    pub const STATION_ID: HeaderName = HeaderName::from_static("stationid");
}

/// URL of the weather resource on `addr` (`host:port`).
pub fn url(addr: &str) -> String {
    format!("http://{}{}", addr, TARGET)
}

/// Trimmed text value of `name`, if present and printable.
pub fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
}

/// The sender's logical timestamp.
pub fn lamport(headers: &HeaderMap) -> Result<u64> {
    let raw = headers.get(header::LAMPORT_CLOCK).ok_or_else(|| {
        Error::Protocol(format!("missing {} header", header::LAMPORT_CLOCK))
    })?;
    raw.to_str()
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| {
            Error::Protocol(format!("invalid {} header: {:?}", header::LAMPORT_CLOCK, raw))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_lamport_header() {
        let mut headers = HeaderMap::new();
        assert!(matches!(lamport(&headers), Err(Error::Protocol(_))));

        headers.insert(header::LAMPORT_CLOCK, HeaderValue::from_static(" 42 "));
        assert_eq!(lamport(&headers).unwrap(), 42);

        headers.insert(header::LAMPORT_CLOCK, HeaderValue::from_static("-1"));
        assert!(matches!(lamport(&headers), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_header_names_ignore_case() {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_bytes(b"StationId").unwrap(),
            HeaderValue::from_static("IDS60901"),
        );
        assert_eq!(header_str(&headers, &header::STATION_ID), Some("IDS60901"));
        assert_eq!(headers.get("STATIONID").unwrap(), "IDS60901");
    }

    #[test]
    fn test_url() {
        assert_eq!(url("127.0.0.1:4567"), "http://127.0.0.1:4567/weather.json");
    }
}
