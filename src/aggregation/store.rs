//! Station store
//!
//! Maps a station id to its latest record together with the instant it was
//! last applied. Both live in the same map entry, so a record and its
//! last-touched time are always inserted and removed together.
//!
//! Writers: the apply loop (insert/replace) and the expiry sweeper
//! (remove). Readers: connection tasks.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

/// Latest document for a station and the timestamp that admitted it
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherRecord {
    pub payload: Value,
    pub timestamp: u64,
}

impl WeatherRecord {
    pub fn new(payload: Value, timestamp: u64) -> Self {
        Self { payload, timestamp }
    }
}

#[derive(Debug)]
struct StationEntry {
    record: Arc<WeatherRecord>,
    last_touched: Instant,
}

/// Station id carried by a document's `id` field.
///
/// String ids are taken verbatim, numeric ids in their JSON text form.
pub fn station_id_of(payload: &Value) -> Option<String> {
    match payload.get("id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[derive(Debug, Default)]
pub struct StationStore {
    stations: RwLock<HashMap<String, StationEntry>>,
}

impl StationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, station_id: &str) -> Option<Arc<WeatherRecord>> {
        self.read().get(station_id).map(|e| e.record.clone())
    }

    pub fn contains(&self, station_id: &str) -> bool {
        self.read().contains_key(station_id)
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn last_touched(&self, station_id: &str) -> Option<Instant> {
        self.read().get(station_id).map(|e| e.last_touched)
    }

    /// Replace the record for `station_id` wholesale and refresh its
    /// last-touched time. Returns `true` if the station was new.
    pub fn upsert(&self, station_id: String, record: WeatherRecord, touched: Instant) -> bool {
        let entry = StationEntry {
            record: Arc::new(record),
            last_touched: touched,
        };
        self.write().insert(station_id, entry).is_none()
    }

    /// Remove every station last touched strictly before `cutoff`, as one
    /// step. Returns the removed ids, sorted.
    pub fn remove_untouched_since(&self, cutoff: Instant) -> Vec<String> {
        let mut stations = self.write();
        let mut removed: Vec<String> = stations
            .iter()
            .filter(|(_, e)| e.last_touched < cutoff)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &removed {
            stations.remove(id);
        }
        removed.sort();
        removed
    }

    /// All payloads, ordered by station id.
    pub fn values(&self) -> Vec<Value> {
        let stations = self.read();
        let mut entries: Vec<_> = stations.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
            .into_iter()
            .map(|(_, e)| e.record.payload.clone())
            .collect()
    }

    // Every critical section leaves the map consistent, so a poisoned lock
    // is still safe to use.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, StationEntry>> {
        self.stations.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, StationEntry>> {
        self.stations.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_store_basic() {
        let store = StationStore::new();
        assert!(store.is_empty());
        assert!(store.get("IDS1").is_none());

        let now = Instant::now();
        assert!(store.upsert("IDS1".into(), WeatherRecord::new(json!({"id": "IDS1"}), 3), now));
        assert!(!store.is_empty());
        assert!(store.contains("IDS1"));
        assert_eq!(store.get("IDS1").unwrap().timestamp, 3);
        assert_eq!(store.last_touched("IDS1"), Some(now));

        // Replaced wholesale, never merged
        let later = now + Duration::from_secs(1);
        assert!(!store.upsert(
            "IDS1".into(),
            WeatherRecord::new(json!({"id": "IDS1", "air_temp": "9.1"}), 8),
            later
        ));
        let record = store.get("IDS1").unwrap();
        assert_eq!(record.timestamp, 8);
        assert_eq!(record.payload["air_temp"], "9.1");
        assert_eq!(store.last_touched("IDS1"), Some(later));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove_untouched_since() {
        let store = StationStore::new();
        let base = Instant::now();
        store.upsert("old".into(), WeatherRecord::new(json!({"id": "old"}), 1), base);
        store.upsert(
            "fresh".into(),
            WeatherRecord::new(json!({"id": "fresh"}), 2),
            base + Duration::from_secs(20),
        );

        let removed = store.remove_untouched_since(base + Duration::from_secs(10));
        assert_eq!(removed, vec!["old".to_string()]);
        assert!(store.get("old").is_none());
        assert!(store.last_touched("old").is_none());
        assert!(store.contains("fresh"));

        // Cutoff equal to last touch keeps the station
        let removed = store.remove_untouched_since(base + Duration::from_secs(20));
        assert!(removed.is_empty());
    }

    #[test]
    fn test_values_sorted_by_id() {
        let store = StationStore::new();
        let now = Instant::now();
        for id in ["c", "a", "b"] {
            store.upsert(id.into(), WeatherRecord::new(json!({ "id": id }), 1), now);
        }
        let ids: Vec<_> = store
            .values()
            .iter()
            .map(|v| v["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_station_id_of() {
        assert_eq!(
            station_id_of(&json!({"id": "IDS60901"})),
            Some("IDS60901".to_string())
        );
        assert_eq!(station_id_of(&json!({"id": 42})), Some("42".to_string()));
        assert_eq!(station_id_of(&json!({"id": ""})), None);
        assert_eq!(station_id_of(&json!({"id": null})), None);
        assert_eq!(station_id_of(&json!({"name": "x"})), None);
        assert_eq!(station_id_of(&json!(["id"])), None);
    }
}
