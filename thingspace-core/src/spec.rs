//! Derivation contract
//!
//! A [`Spec`] knows the schema and computes derived fields: `derive` fills
//! in a value that is not in the graph yet, `rederive` recomputes specific
//! fields of an entity after the changes its reactions watch. Both read the
//! graph through a [`Selector`].

use crate::diff::Diff;
use crate::error::DerivationError;
use crate::schema::Schema;
use crate::thing::{Thing, Value};
use std::collections::{BTreeSet, HashMap};
use thingspace_types::IdKey;

/// Read-only view of the graph
pub trait Selector {
    /// Current built state of an entity
    fn get(&self, key: &IdKey) -> Option<Thing>;

    /// Every live instance of a type, in key order
    fn get_all(&self, type_name: &str) -> Vec<Thing>;

    /// First instance of a type whose `field` equals `value`
    fn find(&self, type_name: &str, field: &str, value: &Value) -> Option<Thing>;
}

pub trait Spec: Send + Sync {
    fn schema(&self) -> &Schema;

    fn derive(&self, thing: &Thing, selector: &dyn Selector) -> Result<Thing, DerivationError>;

    /// Recompute `fields` of `thing`; `diff` is the round that triggered it
    fn rederive(
        &self,
        thing: &Thing,
        fields: &BTreeSet<String>,
        diff: &Diff,
        selector: &dyn Selector,
    ) -> Result<Thing, DerivationError>;
}

/// Computes one field from the thing being derived and the graph
pub type Deriver = Box<dyn Fn(&Thing, &dyn Selector) -> Result<Value, String> + Send + Sync>;

/// Spec built from per-field derivation functions
///
/// Derivers of a type run in registration order and each one sees the
/// fields computed before it.
pub struct SchemaSpec {
    schema: Schema,
    derivers: HashMap<String, Vec<(String, Deriver)>>,
}

impl SchemaSpec {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            derivers: HashMap::new(),
        }
    }

    /// Register how `field` of `type_name` is derived
    pub fn deriving<F>(mut self, type_name: &str, field: &str, deriver: F) -> Self
    where
        F: Fn(&Thing, &dyn Selector) -> Result<Value, String> + Send + Sync + 'static,
    {
        let fields = self.derivers.entry(type_name.to_string()).or_default();
        fields.retain(|(name, _)| name != field);
        fields.push((field.to_string(), Box::new(deriver)));
        self
    }

    fn run(
        &self,
        thing: &Thing,
        wanted: impl Fn(&str) -> bool,
        selector: &dyn Selector,
    ) -> Result<Thing, DerivationError> {
        let mut current = thing.clone();
        for (field, deriver) in self.derivers.get(thing.type_name()).into_iter().flatten() {
            if !wanted(field) {
                continue;
            }
            let value = deriver(&current, selector)
                .map_err(|message| DerivationError::new(thing.key().to_string(), field, message))?;
            current = current.to_builder().set(field.clone(), value).build();
        }
        Ok(current)
    }
}

impl Spec for SchemaSpec {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn derive(&self, thing: &Thing, selector: &dyn Selector) -> Result<Thing, DerivationError> {
        self.run(thing, |_| true, selector)
    }

    fn rederive(
        &self,
        thing: &Thing,
        fields: &BTreeSet<String>,
        _diff: &Diff,
        selector: &dyn Selector,
    ) -> Result<Thing, DerivationError> {
        let known = self.derivers.get(thing.type_name());
        for field in fields {
            if !known.is_some_and(|d| d.iter().any(|(name, _)| name == field)) {
                return Err(DerivationError::new(
                    thing.key().to_string(),
                    field,
                    "no deriver registered",
                ));
            }
        }
        self.run(thing, |name| fields.contains(name), selector)
    }
}

impl std::fmt::Debug for SchemaSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut fields: Vec<String> = self
            .derivers
            .iter()
            .flat_map(|(t, ds)| ds.iter().map(move |(name, _)| format!("{t}.{name}")))
            .collect();
        fields.sort();
        f.debug_struct("SchemaSpec")
            .field("types", &self.schema.len())
            .field("derived", &fields)
            .finish()
    }
}
