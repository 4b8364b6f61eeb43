//! Flat station files to JSON documents
//!
//! Input is one `key: value` pair per line:
//! ```text
//! id: IDS60901
//! name: Adelaide (West Terrace /  ngayirdapira)
//! air_temp: 13.3
//! ```
//! Values are kept as strings. Only the first `:` splits a line, so values
//! may contain colons (e.g. times).

use crate::common::{Error, Result};
use serde_json::{Map, Value};
use std::path::Path;

pub fn parse_station_text(text: &str) -> Result<Map<String, Value>> {
    let mut doc = Map::new();

    for (lineno, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let (key, value) = line.split_once(':').ok_or_else(|| {
            Error::Ingest(format!("line {}: expected `key: value`", lineno + 1))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::Ingest(format!("line {}: empty key", lineno + 1)));
        }
        doc.insert(key.to_string(), Value::String(value.trim().to_string()));
    }

    match doc.get("id") {
        Some(Value::String(id)) if !id.is_empty() => Ok(doc),
        _ => Err(Error::Ingest("station file has no id".into())),
    }
}

pub fn read_station_file(path: impl AsRef<Path>) -> Result<Value> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::Ingest(format!("{}: {}", path.display(), e)))?;
    parse_station_text(&text).map(Value::Object)
}
