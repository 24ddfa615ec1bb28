//! Identity-keyed node arena
//!
//! Every graph node lives in one map keyed by its [`IdKey`]; edges between
//! nodes live in [`References`]. Nodes never hold each other directly, so
//! "does this still exist" always resolves through the map and reference
//! cycles need no special lifetime handling.

use crate::mutable::{Built, Flattened, MutableThing, Mutables, Slot};
use crate::reactions::ReactionGraph;
use crate::references::References;
use crate::spec::Selector;
use crate::thing::{Equality, Thing, Value};
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap, VecDeque};
use thingspace_types::IdKey;
use tracing::trace;

/// Routes node edge events into the reference index
struct Linker<'a> {
    references: &'a mut References,
    changed: &'a mut BTreeSet<IdKey>,
    candidates: &'a mut BTreeSet<IdKey>,
}

impl Mutables for Linker<'_> {
    fn link(&mut self, from: &IdKey, to: &IdKey) {
        self.references.link(from, to);
    }

    fn unlink(&mut self, from: &IdKey, to: &IdKey) {
        self.references.unlink(from, to);
        self.candidates.insert(to.clone());
    }

    fn changed(&mut self, key: &IdKey) {
        self.changed.insert(key.clone());
    }
}

#[derive(Debug, Default)]
pub struct Arena {
    nodes: HashMap<IdKey, MutableThing>,
    references: References,
    by_type: HashMap<String, BTreeSet<IdKey>>,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &IdKey) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn node(&self, key: &IdKey) -> Option<&MutableThing> {
        self.nodes.get(key)
    }

    pub fn references(&self) -> &References {
        &self.references
    }

    pub fn keys(&self) -> impl Iterator<Item = &IdKey> {
        self.nodes.keys()
    }

    /// Live keys of a type, in key order
    pub fn keys_of(&self, type_name: &str) -> impl Iterator<Item = &IdKey> {
        self.by_type.get(type_name).into_iter().flatten()
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.by_type.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn count(&self, type_name: Option<&str>) -> usize {
        match type_name {
            Some(name) => self.by_type.get(name).map_or(0, BTreeSet::len),
            None => self.nodes.len(),
        }
    }

    /// Merge one flattened record, creating its node on first sight
    ///
    /// Created nodes are added to `candidates`, as are nodes that lost an
    /// incoming edge. Nodes whose own state changed go into `changed`.
    pub fn apply(
        &mut self,
        record: Flattened,
        changed: &mut BTreeSet<IdKey>,
        candidates: &mut BTreeSet<IdKey>,
    ) -> bool {
        let Flattened {
            key,
            identity,
            fields,
        } = record;
        let node = match self.nodes.entry(key.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                trace!(key = %key, "Creating node");
                self.by_type
                    .entry(identity.type_name().to_string())
                    .or_default()
                    .insert(key.clone());
                candidates.insert(key.clone());
                entry.insert(MutableThing::new(key, identity))
            }
        };
        let mut linker = Linker {
            references: &mut self.references,
            changed,
            candidates,
        };
        node.imprint(fields, &mut linker)
    }

    /// Flag everything that transitively references a changed node
    ///
    /// Returns the changed nodes plus every referrer reached, with their
    /// cached builds dropped.
    pub fn propagate(&mut self, changed: &BTreeSet<IdKey>) -> BTreeSet<IdKey> {
        let mut affected = changed.clone();
        let mut queue: VecDeque<IdKey> = changed.iter().cloned().collect();
        while let Some(key) = queue.pop_front() {
            if let Some(node) = self.nodes.get_mut(&key) {
                node.invalidate();
            }
            for referrer in self.references.referrers(&key) {
                if affected.insert(referrer.clone()) {
                    queue.push_back(referrer.clone());
                }
            }
        }
        affected
    }

    /// Current state of a node, rebuilt and cached if stale
    pub fn refresh(&mut self, key: &IdKey) -> Option<Thing> {
        let node = self.nodes.get(key)?;
        if let Some(built) = node.built() {
            return Some(built.thing.clone());
        }
        let (thing, cut) = self.build_at(key, &mut Vec::new())?;
        if let Some(node) = self.nodes.get_mut(key) {
            node.set_built(Built {
                thing: thing.clone(),
                self_contained: !cut,
            });
        }
        Some(thing)
    }

    /// Current state of a node without touching the build cache
    pub fn build(&self, key: &IdKey) -> Option<Thing> {
        let node = self.nodes.get(key)?;
        if let Some(built) = node.built() {
            return Some(built.thing.clone());
        }
        self.build_at(key, &mut Vec::new()).map(|(thing, _)| thing)
    }

    /// Build a node below the nodes on `stack`
    ///
    /// A node already on the stack is emitted as its identity only. The flag
    /// reports whether any such cut happened below this node.
    fn build_at(&self, key: &IdKey, stack: &mut Vec<IdKey>) -> Option<(Thing, bool)> {
        let node = self.nodes.get(key)?;
        if stack.contains(key) {
            return Some((node.identity().clone(), true));
        }
        if let Some(built) = node.built().filter(|b| b.self_contained) {
            return Some((built.thing.clone(), false));
        }

        stack.push(key.clone());
        let mut cut = false;
        let mut builder = Thing::builder(node.kind());
        for (name, slot) in node.slots() {
            builder = builder.set(name, self.build_slot(slot, stack, &mut cut));
        }
        stack.pop();
        Some((builder.build(), cut))
    }

    fn build_slot(&self, slot: &Slot, stack: &mut Vec<IdKey>, cut: &mut bool) -> Value {
        match slot {
            Slot::Scalar(value) => value.clone(),
            Slot::List(items) => Value::List(
                items
                    .iter()
                    .map(|item| self.build_slot(item, stack, cut))
                    .collect(),
            ),
            Slot::Link(to) => match self.build_at(to, stack) {
                Some((thing, inner_cut)) => {
                    *cut |= inner_cut;
                    Value::Thing(thing)
                }
                None => Value::Null,
            },
            Slot::Inline { kind, fields } => {
                let mut builder = Thing::builder(kind);
                for (name, nested) in fields {
                    builder = builder.set(name.clone(), self.build_slot(nested, stack, cut));
                }
                Value::Thing(builder.build())
            }
        }
    }

    /// Record `latest` as the node's committed build, returning the former one
    pub fn commit(&mut self, key: &IdKey, latest: Thing) -> Option<Thing> {
        self.nodes.get_mut(key).and_then(|node| node.commit(latest))
    }

    /// Every node reaching `key` through reverse edges, `key` included
    pub fn referrer_closure(&self, key: &IdKey) -> BTreeSet<IdKey> {
        let mut closure = BTreeSet::from([key.clone()]);
        let mut queue = VecDeque::from([key.clone()]);
        while let Some(next) = queue.pop_front() {
            for referrer in self.references.referrers(&next) {
                if self.nodes.contains_key(referrer) && closure.insert(referrer.clone()) {
                    queue.push_back(referrer.clone());
                }
            }
        }
        closure
    }

    /// Remove a node and its outgoing edges, returning the former targets
    pub fn evict(&mut self, key: &IdKey) -> Option<BTreeSet<IdKey>> {
        let node = self.nodes.remove(key)?;
        if let Some(keys) = self.by_type.get_mut(node.kind().name()) {
            keys.remove(key);
            if keys.is_empty() {
                self.by_type.remove(node.kind().name());
            }
        }
        Some(self.references.detach(key))
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.references.clear();
        self.by_type.clear();
    }
}

impl Selector for Arena {
    fn get(&self, key: &IdKey) -> Option<Thing> {
        self.build(key)
    }

    fn get_all(&self, type_name: &str) -> Vec<Thing> {
        self.keys_of(type_name).filter_map(|key| self.build(key)).collect()
    }

    fn find(&self, type_name: &str, field: &str, value: &Value) -> Option<Thing> {
        self.keys_of(type_name)
            .filter_map(|key| self.build(key))
            .find(|thing| {
                thing
                    .get(field)
                    .is_some_and(|v| v.equals(value, Equality::State))
            })
    }
}

impl ReactionGraph for Arena {
    fn instances_of(&self, type_name: &str) -> Vec<IdKey> {
        self.keys_of(type_name).cloned().collect()
    }

    fn referrers_of(&self, key: &IdKey) -> Vec<IdKey> {
        self.references.referrers(key).cloned().collect()
    }

    fn type_of(&self, key: &IdKey) -> Option<String> {
        self.nodes.get(key).map(|node| node.kind().name().to_string())
    }

    fn links_via(&self, from: &IdKey, field: &str, to: &IdKey) -> bool {
        self.nodes
            .get(from)
            .is_some_and(|node| node.links_via(field, to))
    }
}
