//! Shared types for thingspace
//!
//! This crate provides the plain identifiers used across the thingspace
//! crates: identity keys, holders and their lifecycles, remote priorities
//! for pending actions, and revision counters.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity key of a thing
///
/// Derived from a thing's identity-defining fields. Two things with the same
/// key are the same entity, whatever the rest of their state says.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdKey(pub String);

impl IdKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IdKey {
    fn from(key: &str) -> Self {
        IdKey(key.to_string())
    }
}

impl From<String> for IdKey {
    fn from(key: String) -> Self {
        IdKey(key)
    }
}

/// How long a holder's retention lasts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// Released on logout and never survives a process restart
    Session,

    /// Survives restarts until explicitly forgotten
    Persistent,
}

impl Lifecycle {
    /// Returns true if retention under this lifecycle is restored after a restart
    pub fn survives_restart(&self) -> bool {
        matches!(self, Lifecycle::Persistent)
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifecycle::Session => write!(f, "session"),
            Lifecycle::Persistent => write!(f, "persistent"),
        }
    }
}

/// Named retention key
///
/// Callers remember things under a holder to keep them alive in the space,
/// and forget them to let cleanup collect whatever nothing else retains.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Holder {
    name: String,
    lifecycle: Lifecycle,
}

impl Holder {
    pub fn new(name: impl Into<String>, lifecycle: Lifecycle) -> Self {
        Self {
            name: name.into(),
            lifecycle,
        }
    }

    /// A holder released by `forget_session` and on restart
    pub fn session(name: impl Into<String>) -> Self {
        Self::new(name, Lifecycle::Session)
    }

    /// A holder that persists until forgotten
    pub fn persistent(name: impl Into<String>) -> Self {
        Self::new(name, Lifecycle::Persistent)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }
}

impl fmt::Display for Holder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.lifecycle)
    }
}

/// One persisted holder association
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HolderPair {
    pub holder: Holder,
    pub key: IdKey,
}

impl HolderPair {
    pub fn new(holder: Holder, key: IdKey) -> Self {
        Self { holder, key }
    }
}

/// Urgency with which a pending action should reach the remote
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemotePriority {
    /// Send as soon as a connection is available
    Immediately,

    /// Send with the next batch
    Soon,

    /// Send whenever a sync happens to run
    Whenever,
}

impl fmt::Display for RemotePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemotePriority::Immediately => write!(f, "immediately"),
            RemotePriority::Soon => write!(f, "soon"),
            RemotePriority::Whenever => write!(f, "whenever"),
        }
    }
}

/// Revision number, bumped by every transaction that changed the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Revision(pub u64);

impl Revision {
    pub const ZERO: Revision = Revision(0);

    pub fn next(self) -> Revision {
        Revision(self.0 + 1)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}
