//! Whole-state snapshots
//!
//! Format: `{"clockValue": <u64>, "stations": [<station document>, ...]}`.
//!
//! Every persist writes `<snapshot>.tmp` next to the canonical file, syncs
//! it and renames it over the canonical path. The canonical file therefore
//! always holds one complete snapshot, old or new. There is no log: writes
//! applied after the last successful persist are lost on a crash.

use crate::aggregation::stats::NodeStats;
use crate::aggregation::store::{station_id_of, StationStore, WeatherRecord};
use crate::common::{Error, LamportClock, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

/// On-disk document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "clockValue", alias = "Lamport", default)]
    pub clock_value: u64,
    #[serde(default)]
    pub stations: Vec<Value>,
}

/// What a restore found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreOutcome {
    pub stations: usize,
    /// Clock value after the merge
    pub clock: u64,
    /// No snapshot file was present
    pub cold_start: bool,
}

pub struct SnapshotManager {
    path: PathBuf,
    clock: Arc<LamportClock>,
    store: Arc<StationStore>,
    stats: Arc<NodeStats>,
    // Apply loop and sweeper both persist; they share one temp file.
    write_lock: Mutex<()>,
}

impl SnapshotManager {
    pub fn new(
        path: impl Into<PathBuf>,
        clock: Arc<LamportClock>,
        store: Arc<StationStore>,
        stats: Arc<NodeStats>,
    ) -> Self {
        Self {
            path: path.into(),
            clock,
            store,
            stats,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling temp file used while writing
    pub fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "snapshot".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Persist the current clock value and every station.
    pub fn persist(&self) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let snapshot = Snapshot {
            clock_value: self.clock.get(),
            stations: self.store.values(),
        };

        match self.write_atomically(&snapshot) {
            Ok(()) => {
                NodeStats::incr(&self.stats.persists);
                tracing::debug!(
                    path = %self.path.display(),
                    stations = snapshot.stations.len(),
                    lamport = snapshot.clock_value,
                    "snapshot persisted"
                );
                Ok(())
            }
            Err(e) => {
                NodeStats::incr(&self.stats.persist_failures);
                Err(Error::Persistence(format!("{}: {}", self.path.display(), e)))
            }
        }
    }

    fn write_atomically(&self, snapshot: &Snapshot) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(snapshot)?;

        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => Some(p),
            _ => None,
        };
        if let Some(parent) = parent {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.tmp_path();
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;

        // Make the rename itself durable where the platform allows it.
        #[cfg(unix)]
        {
            let dir = parent.unwrap_or_else(|| Path::new("."));
            if let Err(e) = File::open(dir).and_then(|dir| dir.sync_all()) {
                tracing::debug!(error = %e, "directory sync skipped");
            }
        }

        Ok(())
    }

    /// Read and parse the canonical snapshot, if any.
    pub fn load(&self) -> Result<Option<Snapshot>> {
        let bytes = match fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Restore(format!("{}: {}", self.path.display(), e))),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| Error::Restore(format!("{}: {}", self.path.display(), e)))
    }

    /// Repopulate the store and merge the persisted clock value.
    ///
    /// Restored stations get a fresh TTL window starting now; their records
    /// carry the snapshot's clock value as admitting timestamp.
    pub fn restore(&self) -> Result<RestoreOutcome> {
        let Some(snapshot) = self.load()? else {
            return Ok(RestoreOutcome {
                stations: 0,
                clock: self.clock.get(),
                cold_start: true,
            });
        };

        let now = Instant::now();
        let mut restored = 0;
        for payload in snapshot.stations {
            let Some(station_id) = station_id_of(&payload) else {
                tracing::warn!("skipping snapshot station without id");
                continue;
            };
            self.store.upsert(
                station_id,
                WeatherRecord::new(payload, snapshot.clock_value),
                now,
            );
            restored += 1;
        }

        let clock = self.clock.restore(snapshot.clock_value);
        Ok(RestoreOutcome {
            stations: restored,
            clock,
            cold_start: false,
        })
    }

    /// Startup restore; any failure is logged and treated as a cold start.
    pub fn restore_or_cold_start(&self) -> RestoreOutcome {
        match self.restore() {
            Ok(outcome) if outcome.cold_start => {
                tracing::info!(path = %self.path.display(), "no snapshot found, cold start");
                outcome
            }
            Ok(outcome) => {
                tracing::info!(
                    path = %self.path.display(),
                    stations = outcome.stations,
                    lamport = outcome.clock,
                    "restored snapshot"
                );
                outcome
            }
            Err(e) => {
                tracing::error!(error = %e, "snapshot unreadable, starting cold");
                RestoreOutcome {
                    stations: 0,
                    clock: self.clock.get(),
                    cold_start: true,
                }
            }
        }
    }
}
