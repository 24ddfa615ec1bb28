//! Registry of known thing types
//!
//! Storage needs it to turn persisted records back into things, and the
//! reaction index is built from the rules the registered types declare.

use crate::thing::{Thing, ThingBuilder, ThingType};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct Schema {
    types: BTreeMap<String, Arc<ThingType>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type, replacing any previous type with the same name
    pub fn with(mut self, kind: ThingType) -> Self {
        self.types.insert(kind.name().to_string(), Arc::new(kind));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ThingType>> {
        self.types.get(name)
    }

    /// Builder for a new thing of a registered type
    pub fn thing(&self, name: &str) -> Option<ThingBuilder> {
        self.types.get(name).map(Thing::builder)
    }

    pub fn types(&self) -> impl Iterator<Item = &Arc<ThingType>> {
        self.types.values()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
