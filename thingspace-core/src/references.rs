//! Bidirectional reference index
//!
//! Records "entity A references entity B" edges between identifiable nodes.
//! Reverse edges drive change propagation and forward edges are dropped on
//! eviction. Edges are counted, since a node may link the same target from
//! several fields.

use std::collections::{BTreeSet, HashMap};
use thingspace_types::IdKey;

#[derive(Debug, Default, Clone)]
pub struct References {
    /// node -> nodes it references, with multiplicity
    outgoing: HashMap<IdKey, HashMap<IdKey, usize>>,

    /// node -> nodes referencing it, with multiplicity
    incoming: HashMap<IdKey, HashMap<IdKey, usize>>,
}

impl References {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one occurrence of `from -> to`
    pub fn link(&mut self, from: &IdKey, to: &IdKey) {
        *self
            .outgoing
            .entry(from.clone())
            .or_default()
            .entry(to.clone())
            .or_insert(0) += 1;
        *self
            .incoming
            .entry(to.clone())
            .or_default()
            .entry(from.clone())
            .or_insert(0) += 1;
    }

    /// Remove one occurrence of `from -> to`
    ///
    /// Returns true when the last occurrence went away.
    pub fn unlink(&mut self, from: &IdKey, to: &IdKey) -> bool {
        let gone = decrement(&mut self.outgoing, from, to);
        decrement(&mut self.incoming, to, from);
        gone
    }

    pub fn referrers(&self, to: &IdKey) -> impl Iterator<Item = &IdKey> {
        self.incoming.get(to).into_iter().flat_map(|m| m.keys())
    }

    pub fn targets(&self, from: &IdKey) -> impl Iterator<Item = &IdKey> {
        self.outgoing.get(from).into_iter().flat_map(|m| m.keys())
    }

    pub fn has_referrers(&self, to: &IdKey) -> bool {
        self.incoming.get(to).is_some_and(|m| !m.is_empty())
    }

    /// Drop every outgoing edge of `from`, returning the former targets
    pub fn detach(&mut self, from: &IdKey) -> BTreeSet<IdKey> {
        let targets = self.outgoing.remove(from).unwrap_or_default();
        for to in targets.keys() {
            if let Some(referrers) = self.incoming.get_mut(to) {
                referrers.remove(from);
                if referrers.is_empty() {
                    self.incoming.remove(to);
                }
            }
        }
        targets.into_keys().collect()
    }

    /// Number of distinct edges
    pub fn edge_count(&self) -> usize {
        self.outgoing.values().map(HashMap::len).sum()
    }

    pub fn clear(&mut self) {
        self.outgoing.clear();
        self.incoming.clear();
    }
}

fn decrement(index: &mut HashMap<IdKey, HashMap<IdKey, usize>>, a: &IdKey, b: &IdKey) -> bool {
    let Some(edges) = index.get_mut(a) else {
        return false;
    };
    let Some(count) = edges.get_mut(b) else {
        return false;
    };
    *count -= 1;
    if *count > 0 {
        return false;
    }
    edges.remove(b);
    if edges.is_empty() {
        index.remove(a);
    }
    true
}
