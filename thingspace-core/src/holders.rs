//! Holder retention bookkeeping
//!
//! Many-to-many between holders and identity keys. A key named by any
//! holder is never evicted, whether or not the entity exists yet.

use std::collections::{BTreeSet, HashMap};
use thingspace_types::{Holder, HolderPair, IdKey, Lifecycle};

#[derive(Debug, Default, Clone)]
pub struct Holders {
    by_holder: HashMap<Holder, BTreeSet<IdKey>>,
    by_key: HashMap<IdKey, BTreeSet<Holder>>,
}

impl Holders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the pair is new
    pub fn remember(&mut self, holder: &Holder, key: &IdKey) -> bool {
        let added = self
            .by_holder
            .entry(holder.clone())
            .or_default()
            .insert(key.clone());
        self.by_key
            .entry(key.clone())
            .or_default()
            .insert(holder.clone());
        added
    }

    /// Returns true when the pair existed
    pub fn forget(&mut self, holder: &Holder, key: &IdKey) -> bool {
        let removed = match self.by_holder.get_mut(holder) {
            Some(keys) => {
                let removed = keys.remove(key);
                if keys.is_empty() {
                    self.by_holder.remove(holder);
                }
                removed
            }
            None => false,
        };
        if let Some(holders) = self.by_key.get_mut(key) {
            holders.remove(holder);
            if holders.is_empty() {
                self.by_key.remove(key);
            }
        }
        removed
    }

    /// Release everything a holder held, returning the released keys
    pub fn forget_all(&mut self, holder: &Holder) -> BTreeSet<IdKey> {
        let keys = self.by_holder.remove(holder).unwrap_or_default();
        for key in &keys {
            if let Some(holders) = self.by_key.get_mut(key) {
                holders.remove(holder);
                if holders.is_empty() {
                    self.by_key.remove(key);
                }
            }
        }
        keys
    }

    pub fn is_held(&self, key: &IdKey) -> bool {
        self.by_key.contains_key(key)
    }

    pub fn holders_of(&self, key: &IdKey) -> impl Iterator<Item = &Holder> {
        self.by_key.get(key).into_iter().flatten()
    }

    pub fn keys_of(&self, holder: &Holder) -> impl Iterator<Item = &IdKey> {
        self.by_holder.get(holder).into_iter().flatten()
    }

    /// Holders with the given lifecycle
    pub fn with_lifecycle(&self, lifecycle: Lifecycle) -> Vec<Holder> {
        self.by_holder
            .keys()
            .filter(|h| h.lifecycle() == lifecycle)
            .cloned()
            .collect()
    }

    pub fn pairs(&self) -> BTreeSet<HolderPair> {
        self.by_holder
            .iter()
            .flat_map(|(holder, keys)| {
                keys.iter()
                    .map(move |key| HolderPair::new(holder.clone(), key.clone()))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_holder.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_holder.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_holder.clear();
        self.by_key.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remember_forget() {
        let mut holders = Holders::new();
        let h = Holder::persistent("h");
        let k = IdKey::from("k");

        assert!(holders.remember(&h, &k));
        assert!(!holders.remember(&h, &k));
        assert!(holders.is_held(&k));

        assert!(holders.forget(&h, &k));
        assert!(!holders.is_held(&k));
        assert!(holders.is_empty());
    }

    #[test]
    fn test_key_stays_held_by_other_holder() {
        let mut holders = Holders::new();
        let k = IdKey::from("k");
        holders.remember(&Holder::persistent("a"), &k);
        holders.remember(&Holder::session("b"), &k);

        holders.forget(&Holder::persistent("a"), &k);

        assert!(holders.is_held(&k));
        assert_eq!(holders.holders_of(&k).count(), 1);
    }

    #[test]
    fn test_forget_all() {
        let mut holders = Holders::new();
        let h = Holder::session("feed");
        holders.remember(&h, &IdKey::from("a"));
        holders.remember(&h, &IdKey::from("b"));

        let released = holders.forget_all(&h);

        assert_eq!(released.len(), 2);
        assert!(!holders.is_held(&IdKey::from("a")));
        assert_eq!(holders.len(), 0);
    }

    #[test]
    fn test_with_lifecycle_and_pairs() {
        let mut holders = Holders::new();
        holders.remember(&Holder::session("s"), &IdKey::from("a"));
        holders.remember(&Holder::persistent("p"), &IdKey::from("b"));

        assert_eq!(holders.with_lifecycle(Lifecycle::Session), vec![Holder::session("s")]);
        assert_eq!(holders.pairs().len(), 2);
    }
}
