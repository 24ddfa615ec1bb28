//! # thingspace-store
//!
//! Durable [`Storage`] backend for a thingspace [`Space`](thingspace_core::Space).
//!
//! The whole stored state lives in one JSON snapshot file. Each write-behind
//! delta is applied to an in-memory copy and the file is rewritten atomically
//! (write to a sibling `.tmp`, then rename), so a crash mid-write leaves the
//! previous snapshot intact.
//!
//! ```no_run
//! use std::sync::Arc;
//! use thingspace_core::prelude::*;
//! use thingspace_store::JsonFileStorage;
//!
//! # fn main() -> thingspace_core::Result<()> {
//! let schema = Schema::new().with(ThingType::entity("Item", &["id"]));
//! let space = Space::builder(Arc::new(SchemaSpec::new(schema)))
//!     .storage(Arc::new(JsonFileStorage::new("space.json")))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thingspace_core::{RestoreSink, Schema, Storage, StorageError, StoreDelta, StoredState};
use tracing::debug;

/// Snapshot format written by this crate
pub const SNAPSHOT_VERSION: u32 = 1;

/// On-disk form of a stored space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub state: StoredState,
}

impl Snapshot {
    pub fn new(state: StoredState) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            state,
        }
    }
}

/// Read the snapshot at `path`
///
/// Returns `Ok(None)` if no file exists yet.
pub fn load_snapshot(path: &Path) -> Result<Option<Snapshot>, StorageError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let snapshot: Snapshot = serde_json::from_str(&content)?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(StorageError::Corrupt(format!(
            "{} has snapshot version {}, expected {}",
            path.display(),
            snapshot.version,
            SNAPSHOT_VERSION
        )));
    }
    Ok(Some(snapshot))
}

/// Write `state` to `path` as a fresh snapshot
pub fn save_snapshot(path: &Path, state: &StoredState) -> Result<(), StorageError> {
    let json = serde_json::to_string_pretty(&Snapshot::new(state.clone()))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Storage backed by a JSON snapshot file
#[derive(Debug)]
pub struct JsonFileStorage {
    path: PathBuf,
    cached: Mutex<Option<StoredState>>,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<StoredState, StorageError> {
        Ok(load_snapshot(&self.path)?
            .map(|snapshot| snapshot.state)
            .unwrap_or_default())
    }
}

impl Storage for JsonFileStorage {
    fn store(&self, delta: &StoreDelta) -> Result<(), StorageError> {
        let mut cached = self.cached.lock();
        if cached.is_none() {
            *cached = Some(self.read()?);
        }
        let state = cached.get_or_insert_with(StoredState::default);
        state.apply(delta);
        save_snapshot(&self.path, state)?;
        debug!(
            path = %self.path.display(),
            things = state.things.len(),
            "Wrote snapshot"
        );
        Ok(())
    }

    fn restore(&self, schema: &Schema, sink: &mut dyn RestoreSink) -> Result<(), StorageError> {
        let state = self.read()?;
        debug!(
            path = %self.path.display(),
            things = state.things.len(),
            holders = state.holders.len(),
            "Read snapshot"
        );
        state.replay(schema, sink)?;
        *self.cached.lock() = Some(state);
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        let mut cached = self.cached.lock();
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        *cached = Some(StoredState::default());
        debug!(path = %self.path.display(), "Cleared snapshot");
        Ok(())
    }
}
