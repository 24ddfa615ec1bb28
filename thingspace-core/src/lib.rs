//! Thingspace Entity Graph Engine
//!
//! This crate holds an application's synchronized domain model as a graph
//! of entities ("things"), keeps it consistent as pieces change, and lets
//! callers retain subsets of it for as long as they need them.
//!
//! # Architecture
//!
//! Incoming things are split into one node per identifiable entity. Nodes
//! live in an identity-keyed arena and refer to each other through a
//! bidirectional reference index instead of direct pointers:
//!
//! ```text
//! imprint → flatten → apply → propagate → rebuild/diff → reactions → rederive ⟲
//!                                                           ↓
//!                                        cleanup → write-behind delta
//! ```
//!
//! ## Key Features
//!
//! - **Four-way equality**: identity, state, declared state and flat state on one type
//! - **Declared-field merge**: undeclared fields never erase stored values
//! - **Retention**: holders keep entities alive; everything else is reference counted, cycles included
//! - **Reactions**: static per-type tables of what derived fields depend on, run to a bounded fixpoint
//! - **Write-behind**: deltas persist on a background thread; restore runs once, lazily
//!
//! # Example
//!
//! ```rust,ignore
//! use thingspace_core::prelude::*;
//! use std::sync::Arc;
//!
//! let schema = Schema::new().with(ThingType::entity("Item", &["id"]));
//! let space = Space::builder(Arc::new(SchemaSpec::new(schema))).build()?;
//!
//! let item = space.schema().thing("Item").unwrap().set("id", "x").set("title", "A").build();
//! space.remember(&Holder::persistent("saves"), &[item.clone()])?;
//! space.imprint(&item)?;
//!
//! assert_eq!(space.get(&item)?.unwrap().get("title"), Some(&Value::from("A")));
//! ```

#![warn(missing_debug_implementations)]

// Entity model
pub mod thing;
pub mod schema;
pub mod record;
pub mod reactions;

// Graph engine
pub mod references;
pub mod holders;
pub mod mutable;
pub mod arena;
pub mod diff;
pub mod space;

// Collaborators and plumbing
pub mod spec;
pub mod storage;
mod write_behind;
pub mod config;
pub mod error;
pub mod metrics;

// Re-export main types
pub use config::{ConfigError, SpaceConfig, StorageConfig};
pub use diff::{Change, Diff};
pub use error::{DerivationError, ReactiveLoopError, RestoreError, Result, SpaceError};
pub use metrics::{MetricsSnapshot, SpaceMetrics};
pub use reactions::{ReactionRule, Trigger};
pub use record::{RecordError, ThingRecord, ValueRecord};
pub use schema::Schema;
pub use space::{Space, SpaceBuilder};
pub use spec::{SchemaSpec, Selector, Spec};
pub use storage::{
    MemoryStorage, RestoreSink, Storage, StorageError, StoreDelta, StoredAction, StoredState,
};
pub use thing::{Equality, Thing, ThingBuilder, ThingType, Value};
pub use thingspace_types::{Holder, HolderPair, IdKey, Lifecycle, RemotePriority, Revision};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::diff::Diff;
    pub use crate::reactions::{ReactionRule, Trigger};
    pub use crate::schema::Schema;
    pub use crate::space::Space;
    pub use crate::spec::{SchemaSpec, Selector, Spec};
    pub use crate::storage::{MemoryStorage, Storage};
    pub use crate::thing::{Equality, Thing, ThingType, Value};
    pub use thingspace_types::{Holder, IdKey, Lifecycle, RemotePriority};
}
