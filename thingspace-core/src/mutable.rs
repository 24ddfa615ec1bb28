//! Graph-resident mutable nodes
//!
//! Incoming things are first flattened: every identifiable thing found
//! anywhere in the tree becomes its own [`Flattened`] record, and the field
//! that held it becomes a [`Slot::Link`] to its key. Non-identifiable values
//! stay inline inside the node that owns them, so the owning node is their
//! root and their links count as the owner's edges.
//!
//! A [`MutableThing`] then merges one record's declared fields into its
//! state, reporting edge and change events through [`Mutables`].

use crate::error::{Result, SpaceError};
use crate::thing::{Thing, ThingType, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use thingspace_types::IdKey;

/// Protocol nodes use to maintain graph edges and flag changes
pub trait Mutables {
    /// `from` gained one link to `to`
    fn link(&mut self, from: &IdKey, to: &IdKey);

    /// `from` lost one link to `to`
    fn unlink(&mut self, from: &IdKey, to: &IdKey);

    /// The node's own state changed
    fn changed(&mut self, key: &IdKey);
}

/// Stored form of one field value
#[derive(Debug, Clone)]
pub enum Slot {
    Scalar(Value),
    List(Vec<Slot>),
    Link(IdKey),
    Inline {
        kind: Arc<ThingType>,
        fields: BTreeMap<String, Slot>,
    },
}

impl Slot {
    /// Every key this slot links to, with repetitions
    pub fn links(&self) -> Vec<IdKey> {
        let mut out = Vec::new();
        self.collect_links(&mut out);
        out
    }

    fn collect_links(&self, out: &mut Vec<IdKey>) {
        match self {
            Slot::Scalar(_) => {}
            Slot::Link(key) => out.push(key.clone()),
            Slot::List(items) => items.iter().for_each(|s| s.collect_links(out)),
            Slot::Inline { fields, .. } => fields.values().for_each(|s| s.collect_links(out)),
        }
    }

    pub fn contains_link(&self, to: &IdKey) -> bool {
        match self {
            Slot::Scalar(_) => false,
            Slot::Link(key) => key == to,
            Slot::List(items) => items.iter().any(|s| s.contains_link(to)),
            Slot::Inline { fields, .. } => fields.values().any(|s| s.contains_link(to)),
        }
    }
}

impl PartialEq for Slot {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Slot::Scalar(a), Slot::Scalar(b)) => a == b,
            (Slot::List(a), Slot::List(b)) => a == b,
            (Slot::Link(a), Slot::Link(b)) => a == b,
            (
                Slot::Inline { kind: ka, fields: fa },
                Slot::Inline { kind: kb, fields: fb },
            ) => ka.name() == kb.name() && fa == fb,
            _ => false,
        }
    }
}

/// One identifiable thing's declared fields, with nested entities as links
#[derive(Debug, Clone)]
pub struct Flattened {
    pub key: IdKey,
    pub identity: Thing,
    pub fields: BTreeMap<String, Slot>,
}

/// Split an identifiable thing into per-entity records
///
/// Nested records come before the records that link to them, and the
/// top-level thing is last.
pub fn flatten(thing: &Thing) -> Result<Vec<Flattened>> {
    let key = thing.idkey().ok_or_else(|| {
        SpaceError::invalid(format!(
            "{} is not identifiable and cannot be a graph node",
            thing.type_name()
        ))
    })?;
    let mut out = Vec::new();
    flatten_into(thing, key, &mut out)?;
    Ok(out)
}

fn flatten_into(thing: &Thing, key: IdKey, out: &mut Vec<Flattened>) -> Result<()> {
    let mut fields = BTreeMap::new();
    for (name, value) in thing.fields() {
        fields.insert(name.to_string(), to_slot(value, out)?);
    }
    out.push(Flattened {
        key,
        identity: thing.identity(),
        fields,
    });
    Ok(())
}

fn to_slot(value: &Value, out: &mut Vec<Flattened>) -> Result<Slot> {
    Ok(match value {
        Value::List(items) => Slot::List(
            items
                .iter()
                .map(|item| to_slot(item, out))
                .collect::<Result<_>>()?,
        ),
        Value::Thing(thing) if thing.kind().has_identity() => {
            let key = thing.idkey().ok_or_else(|| {
                SpaceError::invalid(format!(
                    "nested {} is missing identity fields {:?}",
                    thing.type_name(),
                    thing.kind().identity_fields()
                ))
            })?;
            flatten_into(thing, key.clone(), out)?;
            Slot::Link(key)
        }
        Value::Thing(thing) => {
            let mut fields = BTreeMap::new();
            for (name, value) in thing.fields() {
                fields.insert(name.to_string(), to_slot(value, out)?);
            }
            Slot::Inline {
                kind: Arc::clone(thing.kind()),
                fields,
            }
        }
        scalar => Slot::Scalar(scalar.clone()),
    })
}

/// Memoized build of a node
#[derive(Debug, Clone)]
pub struct Built {
    pub thing: Thing,
    /// False when a reference cycle was cut while building, in which case
    /// the value is only valid as this node's own top-level build
    pub self_contained: bool,
}

/// Mutable wrapper around one entity's current state
#[derive(Debug)]
pub struct MutableThing {
    key: IdKey,
    identity: Thing,
    fields: BTreeMap<String, Slot>,
    built: Option<Built>,
    previous: Option<Thing>,
}

impl MutableThing {
    pub fn new(key: IdKey, identity: Thing) -> Self {
        Self {
            key,
            identity,
            fields: BTreeMap::new(),
            built: None,
            previous: None,
        }
    }

    pub fn key(&self) -> &IdKey {
        &self.key
    }

    pub fn kind(&self) -> &Arc<ThingType> {
        self.identity.kind()
    }

    /// Identity-only thing, used where a cycle is cut
    pub fn identity(&self) -> &Thing {
        &self.identity
    }

    pub fn slot(&self, field: &str) -> Option<&Slot> {
        self.fields.get(field)
    }

    pub fn slots(&self) -> impl Iterator<Item = (&str, &Slot)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Whether field `field` links to `to`
    pub fn links_via(&self, field: &str, to: &IdKey) -> bool {
        self.fields.get(field).is_some_and(|s| s.contains_link(to))
    }

    /// Merge declared fields; undeclared fields never erase existing values
    ///
    /// Returns true when the node's state changed.
    pub fn imprint(&mut self, incoming: BTreeMap<String, Slot>, mutables: &mut dyn Mutables) -> bool {
        let mut changed = false;
        for (field, slot) in incoming {
            match self.fields.get_mut(&field) {
                Some(existing) => changed |= merge_slot(&self.key, existing, slot, mutables),
                None => {
                    link_all(&self.key, &slot, mutables);
                    self.fields.insert(field, slot);
                    changed = true;
                }
            }
        }
        if changed {
            self.built = None;
            mutables.changed(&self.key);
        }
        changed
    }

    pub fn built(&self) -> Option<&Built> {
        self.built.as_ref()
    }

    pub fn set_built(&mut self, built: Built) {
        self.built = Some(built);
    }

    pub fn invalidate(&mut self) {
        self.built = None;
    }

    /// The build committed by the last diff, if any
    pub fn previous(&self) -> Option<&Thing> {
        self.previous.as_ref()
    }

    /// Record `latest` as the committed build, returning the former one
    pub fn commit(&mut self, latest: Thing) -> Option<Thing> {
        self.previous.replace(latest)
    }
}

fn link_all(owner: &IdKey, slot: &Slot, mutables: &mut dyn Mutables) {
    for to in slot.links() {
        mutables.link(owner, &to);
    }
}

fn unlink_all(owner: &IdKey, slot: &Slot, mutables: &mut dyn Mutables) {
    for to in slot.links() {
        mutables.unlink(owner, &to);
    }
}

fn merge_slot(owner: &IdKey, existing: &mut Slot, incoming: Slot, mutables: &mut dyn Mutables) -> bool {
    match (existing, incoming) {
        (
            Slot::Inline { kind, fields },
            Slot::Inline {
                kind: incoming_kind,
                fields: incoming_fields,
            },
        ) if kind.name() == incoming_kind.name() => {
            let mut changed = false;
            for (name, slot) in incoming_fields {
                match fields.get_mut(&name) {
                    Some(nested) => changed |= merge_slot(owner, nested, slot, mutables),
                    None => {
                        link_all(owner, &slot, mutables);
                        fields.insert(name, slot);
                        changed = true;
                    }
                }
            }
            changed
        }
        (existing, incoming) => {
            if *existing == incoming {
                return false;
            }
            unlink_all(owner, existing, mutables);
            link_all(owner, &incoming, mutables);
            *existing = incoming;
            true
        }
    }
}
