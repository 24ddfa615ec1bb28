//! Persistence contract
//!
//! The space mirrors its state into a [`Storage`] backend with write-behind
//! deltas and reads it back once, lazily, on its first transaction. The
//! in-memory graph stays the source of truth: a failed store is logged and
//! dropped, and the next change re-submits current state.

use crate::record::{RecordError, ThingRecord};
use crate::schema::Schema;
use crate::thing::Thing;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use thingspace_types::{HolderPair, IdKey, RemotePriority};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize storage: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Stored data names an unregistered type: {0}")]
    UnknownType(String),

    #[error("Stored data is corrupt: {0}")]
    Corrupt(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl From<RecordError> for StorageError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::UnknownType(name) => StorageError::UnknownType(name),
        }
    }
}

/// Receives restored state, one callback per kind of data
pub trait RestoreSink {
    fn on_thing(&mut self, thing: Thing);
    fn on_holders(&mut self, pairs: Vec<HolderPair>);
    fn on_actions(&mut self, actions: Vec<(Thing, RemotePriority)>);
    fn on_invalid(&mut self, things: Vec<Thing>);
}

/// Persistence backend
///
/// Stores are called from the write-behind worker thread and restore from
/// the thread running the space's first transaction, so implementations
/// synchronize internally.
pub trait Storage: Send + Sync {
    fn store(&self, delta: &StoreDelta) -> Result<(), StorageError>;

    fn restore(&self, schema: &Schema, sink: &mut dyn RestoreSink) -> Result<(), StorageError>;

    fn clear(&self) -> Result<(), StorageError>;
}

/// Net changes of one transaction
///
/// Later calls for the same key cancel earlier opposite ones, so an entity
/// added and then evicted within a transaction only shows up as a removal.
#[derive(Debug, Clone, Default)]
pub struct StoreDelta {
    pub add_things: BTreeMap<IdKey, Thing>,
    pub remove_things: BTreeSet<IdKey>,
    pub add_holders: BTreeSet<HolderPair>,
    pub remove_holders: BTreeSet<HolderPair>,
    pub add_actions: BTreeMap<IdKey, (Thing, RemotePriority)>,
    pub remove_actions: BTreeSet<IdKey>,
    pub add_invalid: BTreeMap<IdKey, Thing>,
    pub remove_invalid: BTreeSet<IdKey>,
}

impl StoreDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_thing(&mut self, key: IdKey, thing: Thing) {
        self.remove_things.remove(&key);
        self.add_things.insert(key, thing);
    }

    pub fn remove_thing(&mut self, key: IdKey) {
        self.add_things.remove(&key);
        self.remove_things.insert(key);
    }

    pub fn add_holder(&mut self, pair: HolderPair) {
        self.remove_holders.remove(&pair);
        self.add_holders.insert(pair);
    }

    pub fn remove_holder(&mut self, pair: HolderPair) {
        self.add_holders.remove(&pair);
        self.remove_holders.insert(pair);
    }

    pub fn add_action(&mut self, key: IdKey, action: Thing, priority: RemotePriority) {
        self.remove_actions.remove(&key);
        self.add_actions.insert(key, (action, priority));
    }

    pub fn remove_action(&mut self, key: IdKey) {
        self.add_actions.remove(&key);
        self.remove_actions.insert(key);
    }

    pub fn add_invalid(&mut self, key: IdKey, thing: Thing) {
        self.remove_invalid.remove(&key);
        self.add_invalid.insert(key, thing);
    }

    pub fn remove_invalid(&mut self, key: IdKey) {
        self.add_invalid.remove(&key);
        self.remove_invalid.insert(key);
    }

    pub fn is_empty(&self) -> bool {
        self.add_things.is_empty()
            && self.remove_things.is_empty()
            && self.add_holders.is_empty()
            && self.remove_holders.is_empty()
            && self.add_actions.is_empty()
            && self.remove_actions.is_empty()
            && self.add_invalid.is_empty()
            && self.remove_invalid.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAction {
    pub action: ThingRecord,
    pub priority: RemotePriority,
}

/// Everything a backend persists, in serializable form
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredState {
    #[serde(default)]
    pub things: BTreeMap<IdKey, ThingRecord>,
    #[serde(default)]
    pub holders: BTreeSet<HolderPair>,
    #[serde(default)]
    pub actions: BTreeMap<IdKey, StoredAction>,
    #[serde(default)]
    pub invalid: BTreeMap<IdKey, ThingRecord>,
}

impl StoredState {
    pub fn apply(&mut self, delta: &StoreDelta) {
        for key in &delta.remove_things {
            self.things.remove(key);
        }
        for (key, thing) in &delta.add_things {
            self.things.insert(key.clone(), ThingRecord::from(thing));
        }
        for pair in &delta.remove_holders {
            self.holders.remove(pair);
        }
        self.holders.extend(delta.add_holders.iter().cloned());
        for key in &delta.remove_actions {
            self.actions.remove(key);
        }
        for (key, (action, priority)) in &delta.add_actions {
            self.actions.insert(
                key.clone(),
                StoredAction {
                    action: ThingRecord::from(action),
                    priority: *priority,
                },
            );
        }
        for key in &delta.remove_invalid {
            self.invalid.remove(key);
        }
        for (key, thing) in &delta.add_invalid {
            self.invalid.insert(key.clone(), ThingRecord::from(thing));
        }
    }

    /// Feed the stored state into a sink, resolving records against `schema`
    pub fn replay(&self, schema: &Schema, sink: &mut dyn RestoreSink) -> Result<(), StorageError> {
        for record in self.things.values() {
            sink.on_thing(record.clone().into_thing(schema)?);
        }
        sink.on_holders(self.holders.iter().cloned().collect());

        let mut actions = Vec::with_capacity(self.actions.len());
        for stored in self.actions.values() {
            actions.push((stored.action.clone().into_thing(schema)?, stored.priority));
        }
        sink.on_actions(actions);

        let mut invalid = Vec::with_capacity(self.invalid.len());
        for record in self.invalid.values() {
            invalid.push(record.clone().into_thing(schema)?);
        }
        sink.on_invalid(invalid);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.things.is_empty()
            && self.holders.is_empty()
            && self.actions.is_empty()
            && self.invalid.is_empty()
    }
}

/// In-process backend
///
/// Share one instance between spaces (behind an `Arc`) to simulate a
/// restart. [`MemoryStorage::set_failing`] makes every call fail.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: Mutex<StoredState>,
    failing: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Copy of what is currently stored
    pub fn snapshot(&self) -> StoredState {
        self.state.lock().clone()
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("memory storage set to fail".to_string()));
        }
        Ok(())
    }
}

impl Storage for MemoryStorage {
    fn store(&self, delta: &StoreDelta) -> Result<(), StorageError> {
        self.check()?;
        self.state.lock().apply(delta);
        Ok(())
    }

    fn restore(&self, schema: &Schema, sink: &mut dyn RestoreSink) -> Result<(), StorageError> {
        self.check()?;
        let state = self.state.lock().clone();
        state.replay(schema, sink)
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.check()?;
        *self.state.lock() = StoredState::default();
        Ok(())
    }
}
