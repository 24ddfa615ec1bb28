//! Accumulated changes of a unit of work
//!
//! A [`Diff`] records which entities were added or changed and which keys
//! were flagged invalid. Diffs from consecutive operations merge with
//! [`Diff::merge`], which is associative: the first entry decides the kind
//! and the earliest previous value, the last entry decides the latest value.

use crate::thing::Thing;
use std::collections::BTreeMap;
use thingspace_types::IdKey;

#[derive(Debug, Clone)]
pub enum Change {
    Added(Thing),
    Changed { previous: Thing, latest: Thing },
}

impl Change {
    pub fn latest(&self) -> &Thing {
        match self {
            Change::Added(latest) | Change::Changed { latest, .. } => latest,
        }
    }

    pub fn previous(&self) -> Option<&Thing> {
        match self {
            Change::Added(_) => None,
            Change::Changed { previous, .. } => Some(previous),
        }
    }

    pub fn is_added(&self) -> bool {
        matches!(self, Change::Added(_))
    }

    fn then(self, later: Change) -> Change {
        match (self, later) {
            (Change::Added(_), later) => Change::Added(later.latest().clone()),
            (Change::Changed { previous, .. }, later) => Change::Changed {
                previous,
                latest: later.latest().clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Diff {
    changes: BTreeMap<IdKey, Change>,
    invalidated: BTreeMap<IdKey, Thing>,
}

impl Diff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_added(&mut self, key: IdKey, latest: Thing) {
        self.push(key, Change::Added(latest));
    }

    pub fn record_changed(&mut self, key: IdKey, previous: Thing, latest: Thing) {
        self.push(key, Change::Changed { previous, latest });
    }

    pub fn record_invalid(&mut self, thing: Thing) {
        self.invalidated.insert(thing.key(), thing);
    }

    fn push(&mut self, key: IdKey, change: Change) {
        let merged = match self.changes.remove(&key) {
            Some(earlier) => earlier.then(change),
            None => change,
        };
        self.changes.insert(key, merged);
    }

    /// Fold a later diff into this one
    pub fn merge(&mut self, later: Diff) {
        for (key, change) in later.changes {
            self.push(key, change);
        }
        self.invalidated.extend(later.invalidated);
    }

    pub fn get(&self, key: &IdKey) -> Option<&Change> {
        self.changes.get(key)
    }

    pub fn contains(&self, key: &IdKey) -> bool {
        self.changes.contains_key(key)
    }

    pub fn changes(&self) -> impl Iterator<Item = (&IdKey, &Change)> {
        self.changes.iter()
    }

    pub fn added(&self) -> impl Iterator<Item = &Thing> {
        self.changes.values().filter_map(|c| match c {
            Change::Added(t) => Some(t),
            Change::Changed { .. } => None,
        })
    }

    /// `(previous, latest)` pairs of changed entities
    pub fn changed(&self) -> impl Iterator<Item = (&Thing, &Thing)> {
        self.changes.values().filter_map(|c| match c {
            Change::Changed { previous, latest } => Some((previous, latest)),
            Change::Added(_) => None,
        })
    }

    pub fn invalidated(&self) -> impl Iterator<Item = &Thing> {
        self.invalidated.values()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.invalidated.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thing::{Equality, ThingType};
    use std::sync::Arc;

    fn item(title: &str) -> Thing {
        let kind = Arc::new(ThingType::entity("Item", &["id"]));
        Thing::builder(&kind).set("id", "x").set("title", title).build()
    }

    fn key() -> IdKey {
        IdKey::from("x")
    }

    #[test]
    fn test_added_then_changed_stays_added() {
        let mut diff = Diff::new();
        diff.record_added(key(), item("A"));
        diff.record_changed(key(), item("A"), item("B"));

        let change = diff.get(&key()).unwrap();
        assert!(change.is_added());
        assert!(change.latest().equals(&item("B"), Equality::State));
        assert_eq!(diff.len(), 1);
    }

    #[test]
    fn test_changes_keep_first_previous() {
        let mut first = Diff::new();
        first.record_changed(key(), item("A"), item("B"));
        let mut second = Diff::new();
        second.record_changed(key(), item("B"), item("C"));

        first.merge(second);

        let (previous, latest) = first.changed().next().unwrap();
        assert!(previous.equals(&item("A"), Equality::State));
        assert!(latest.equals(&item("C"), Equality::State));
    }

    #[test]
    fn test_invalidated_is_not_a_change() {
        let mut diff = Diff::new();
        diff.record_invalid(item("A"));

        assert!(!diff.is_empty());
        assert_eq!(diff.len(), 0);
        assert_eq!(diff.invalidated().count(), 1);
    }
}
