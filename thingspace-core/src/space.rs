//! The space facade
//!
//! [`Space`] owns the whole graph and its indices behind one mutex. Every
//! public operation runs as a transaction holding that lock: the first one
//! restores persisted state, mutating ones finish by running cleanup and
//! handing their delta to the write-behind worker.

use crate::arena::Arena;
use crate::config::SpaceConfig;
use crate::diff::Diff;
use crate::error::{ReactiveLoopError, RestoreError, Result, SpaceError};
use crate::holders::Holders;
use crate::metrics::{MetricsSnapshot, SpaceMetrics};
use crate::mutable::flatten;
use crate::reactions::{Reactions, Touched};
use crate::schema::Schema;
use crate::spec::{Selector, Spec};
use crate::storage::{MemoryStorage, RestoreSink, Storage, StoreDelta};
use crate::thing::{Equality, Thing, Value};
use crate::write_behind::{Job, WriteBehind};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thingspace_types::{Holder, HolderPair, IdKey, Lifecycle, RemotePriority, Revision};
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Warmup {
    Cold,
    Ready,
    Failed,
    Released,
}

struct SpaceState {
    warmup: Warmup,
    arena: Arena,
    holders: Holders,
    actions: BTreeMap<IdKey, (Thing, RemotePriority)>,
    invalid: BTreeMap<IdKey, Thing>,
    session: Option<Diff>,
    revision: Revision,
}

impl SpaceState {
    fn new() -> Self {
        Self {
            warmup: Warmup::Cold,
            arena: Arena::new(),
            holders: Holders::new(),
            actions: BTreeMap::new(),
            invalid: BTreeMap::new(),
            session: None,
            revision: Revision::ZERO,
        }
    }

    fn reset(&mut self) {
        self.arena.clear();
        self.holders.clear();
        self.actions.clear();
        self.invalid.clear();
    }
}

/// Client-side entity graph store
pub struct Space {
    spec: Arc<dyn Spec>,
    reactions: Reactions,
    config: SpaceConfig,
    storage: Arc<dyn Storage>,
    writer: WriteBehind,
    metrics: Arc<SpaceMetrics>,
    state: Mutex<SpaceState>,
}

pub struct SpaceBuilder {
    spec: Arc<dyn Spec>,
    storage: Option<Arc<dyn Storage>>,
    config: SpaceConfig,
}

impl std::fmt::Debug for SpaceBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpaceBuilder")
            .field("has_storage", &self.storage.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SpaceBuilder {
    /// Persistence backend; defaults to a fresh [`MemoryStorage`]
    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn config(mut self, config: SpaceConfig) -> Self {
        self.config = config;
        self
    }

    /// Start the write-behind worker and return the space
    ///
    /// Nothing is restored yet; that happens on the first transaction.
    pub fn build(self) -> Result<Space> {
        self.config
            .validate()
            .map_err(|err| SpaceError::invalid(err.to_string()))?;
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(MemoryStorage::new()) as Arc<dyn Storage>);
        let metrics = Arc::new(SpaceMetrics::new());
        let writer = WriteBehind::start(Arc::clone(&storage), Arc::clone(&metrics))
            .map_err(SpaceError::Worker)?;
        let reactions = Reactions::from_schema(self.spec.schema());
        Ok(Space {
            spec: self.spec,
            reactions,
            config: self.config,
            storage,
            writer,
            metrics,
            state: Mutex::new(SpaceState::new()),
        })
    }
}

impl Space {
    pub fn builder(spec: Arc<dyn Spec>) -> SpaceBuilder {
        SpaceBuilder {
            spec,
            storage: None,
            config: SpaceConfig::default(),
        }
    }

    pub fn schema(&self) -> &Schema {
        self.spec.schema()
    }

    pub fn config(&self) -> &SpaceConfig {
        &self.config
    }

    /// Keep the given entities alive for `holder`
    pub fn remember(&self, holder: &Holder, things: &[Thing]) -> Result<()> {
        self.transact("remember", |tx| {
            let keys = identity_keys(things)?;
            for key in keys {
                tx.remember(holder, key);
            }
            Ok(())
        })
    }

    /// Release the given entities; an empty slice releases everything the
    /// holder held
    pub fn forget(&self, holder: &Holder, things: &[Thing]) -> Result<()> {
        if things.is_empty() {
            return self.forget_all(holder);
        }
        self.transact("forget", |tx| {
            let keys = identity_keys(things)?;
            for key in keys {
                tx.forget(holder, key);
            }
            Ok(())
        })
    }

    pub fn forget_all(&self, holder: &Holder) -> Result<()> {
        self.transact("forget_all", |tx| {
            tx.forget_all(holder);
            Ok(())
        })
    }

    /// Release every session-lifecycle holder
    pub fn forget_session(&self) -> Result<()> {
        self.transact("forget_session", |tx| {
            for holder in tx.state.holders.with_lifecycle(Lifecycle::Session) {
                tx.forget_all(&holder);
            }
            Ok(())
        })
    }

    /// Merge one thing into the graph and rederive to a fixpoint
    ///
    /// Returns what this call changed. Entities nothing holds or references
    /// are collected again before the call returns.
    pub fn imprint(&self, thing: &Thing) -> Result<Diff> {
        self.imprint_all(vec![thing.clone()])
    }

    pub fn imprint_all(&self, things: impl IntoIterator<Item = Thing>) -> Result<Diff> {
        let things: Vec<Thing> = things.into_iter().collect();
        self.transact("imprint", |tx| tx.imprint(things))
    }

    pub fn get(&self, thing: &Thing) -> Result<Option<Thing>> {
        let key = identity_key(thing)?;
        self.get_key(&key)
    }

    pub fn get_key(&self, key: &IdKey) -> Result<Option<Thing>> {
        self.read(|state| state.arena.build(key))
    }

    /// Every instance of a type, in key order
    pub fn get_all(&self, type_name: &str) -> Result<Vec<Thing>> {
        self.read(|state| state.arena.get_all(type_name))
    }

    /// First instance of a type whose `field` equals `value`
    pub fn find(&self, type_name: &str, field: &str, value: &Value) -> Result<Option<Thing>> {
        self.read(|state| state.arena.find(type_name, field, value))
    }

    pub fn contains(&self, things: &[Thing]) -> Result<Vec<bool>> {
        let keys = identity_keys(things)?;
        self.contains_keys(&keys)
    }

    pub fn contains_keys(&self, keys: &[IdKey]) -> Result<Vec<bool>> {
        self.read(|state| keys.iter().map(|k| state.arena.contains(k)).collect())
    }

    /// Number of live entities of a type, or of all types
    pub fn count(&self, type_name: Option<&str>) -> Result<usize> {
        self.read(|state| state.arena.count(type_name))
    }

    /// Holder associations currently in effect
    pub fn holder_pairs(&self) -> Result<BTreeSet<HolderPair>> {
        self.read(|state| state.holders.pairs())
    }

    /// Compute derived fields of a thing that is not in the graph yet
    pub fn derive(&self, thing: &Thing) -> Result<Thing> {
        self.read(|state| self.spec.derive(thing, &state.arena))?
            .map_err(SpaceError::from)
    }

    pub fn add_invalid(&self, thing: &Thing) -> Result<()> {
        self.transact("add_invalid", |tx| {
            let key = thing.key();
            tx.state.invalid.insert(key.clone(), thing.clone());
            tx.diff.record_invalid(thing.clone());
            tx.delta.add_invalid(key, thing.clone());
            Ok(())
        })
    }

    pub fn invalid(&self) -> Result<Vec<Thing>> {
        self.read(|state| state.invalid.values().cloned().collect())
    }

    pub fn clear_invalid(&self, things: &[Thing]) -> Result<()> {
        self.transact("clear_invalid", |tx| {
            for thing in things {
                let key = thing.key();
                if tx.state.invalid.remove(&key).is_some() {
                    tx.delta.remove_invalid(key);
                }
            }
            Ok(())
        })
    }

    /// Queue an action, replacing any pending one with the same key
    pub fn add_action(&self, action: &Thing, priority: RemotePriority) -> Result<()> {
        self.transact("add_action", |tx| {
            let key = action.key();
            tx.state
                .actions
                .insert(key.clone(), (action.clone(), priority));
            tx.delta.add_action(key, action.clone(), priority);
            Ok(())
        })
    }

    pub fn actions(&self) -> Result<Vec<(Thing, RemotePriority)>> {
        self.read(|state| state.actions.values().cloned().collect())
    }

    pub fn clear_actions(&self, actions: &[Thing]) -> Result<()> {
        self.transact("clear_actions", |tx| {
            for action in actions {
                let key = action.key();
                if tx.state.actions.remove(&key).is_some() {
                    tx.delta.remove_action(key);
                }
            }
            Ok(())
        })
    }

    /// Open a diff session, discarding any session still open
    pub fn start_diff(&self) -> Result<()> {
        self.transact("start_diff", |tx| {
            tx.state.session = Some(Diff::new());
            Ok(())
        })
    }

    /// Close the diff session and return everything it accumulated
    pub fn end_diff(&self) -> Result<Diff> {
        self.transact("end_diff", |tx| Ok(tx.state.session.take().unwrap_or_default()))
    }

    /// Drop all in-memory state and ask storage to clear
    pub fn clear(&self) -> Result<()> {
        self.transact("clear", |tx| {
            tx.clear();
            Ok(())
        })
    }

    /// Stop accepting operations and drain pending writes
    pub fn release(&self) {
        {
            let mut state = self.state.lock();
            if state.warmup == Warmup::Released {
                return;
            }
            state.warmup = Warmup::Released;
        }
        self.writer.shutdown();
        info!("Space released");
    }

    /// Block until pending writes are persisted, or `timeout` passes
    pub fn await_writes(&self, timeout: Duration) -> bool {
        self.writer.wait_idle(timeout)
    }

    pub fn revision(&self) -> Revision {
        self.state.lock().revision
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    fn read<T>(&self, f: impl FnOnce(&SpaceState) -> T) -> Result<T> {
        let mut state = self.state.lock();
        self.warm_up(&mut state)?;
        self.metrics.record_transaction();
        Ok(f(&*state))
    }

    fn transact<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&mut Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut state = self.state.lock();
        self.warm_up(&mut state)?;
        self.metrics.record_transaction();
        let mut tx = Transaction::new(self, &mut state);
        let result = f(&mut tx);
        tx.finish(op);
        result
    }

    fn warm_up(&self, state: &mut SpaceState) -> Result<()> {
        match state.warmup {
            Warmup::Ready => Ok(()),
            Warmup::Failed => Err(SpaceError::Poisoned),
            Warmup::Released => Err(SpaceError::Released),
            Warmup::Cold => match self.restore(state) {
                Ok(()) => {
                    state.warmup = Warmup::Ready;
                    Ok(())
                }
                Err(err) => {
                    error!(error = %err, "Restore failed, space is unusable");
                    state.reset();
                    state.warmup = Warmup::Failed;
                    Err(err.into())
                }
            },
        }
    }

    fn restore(&self, state: &mut SpaceState) -> std::result::Result<(), RestoreError> {
        let started = Instant::now();
        let mut restored = Restored::default();
        self.storage.restore(self.spec.schema(), &mut restored)?;

        let mut tx = Transaction::new(self, state);
        let mut changed = BTreeSet::new();
        for thing in &restored.things {
            tx.absorb(thing, &mut changed)
                .map_err(|err| RestoreError::Rejected {
                    key: thing.key().to_string(),
                    reason: err.to_string(),
                })?;
        }
        tx.settle(&changed);

        for pair in &restored.holders {
            tx.state.holders.remember(&pair.holder, &pair.key);
        }
        for (action, priority) in restored.actions {
            tx.state.actions.insert(action.key(), (action, priority));
        }
        for thing in restored.invalid {
            tx.state.invalid.insert(thing.key(), thing);
        }
        for holder in tx.state.holders.with_lifecycle(Lifecycle::Session) {
            debug!(holder = %holder, "Dropping session holder from previous run");
            tx.forget_all(&holder);
        }
        tx.finish("restore");

        info!(
            things = state.arena.len(),
            holders = state.holders.len(),
            actions = state.actions.len(),
            invalid = state.invalid.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Restored space"
        );
        Ok(())
    }
}

impl std::fmt::Debug for Space {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Space")
            .field("types", &self.spec.schema().len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Collects what storage hands back during restore
#[derive(Default)]
struct Restored {
    things: Vec<Thing>,
    holders: Vec<HolderPair>,
    actions: Vec<(Thing, RemotePriority)>,
    invalid: Vec<Thing>,
}

impl RestoreSink for Restored {
    fn on_thing(&mut self, thing: Thing) {
        self.things.push(thing);
    }

    fn on_holders(&mut self, pairs: Vec<HolderPair>) {
        self.holders.extend(pairs);
    }

    fn on_actions(&mut self, actions: Vec<(Thing, RemotePriority)>) {
        self.actions.extend(actions);
    }

    fn on_invalid(&mut self, things: Vec<Thing>) {
        self.invalid.extend(things);
    }
}

/// One serialized unit of work over the space state
struct Transaction<'a> {
    space: &'a Space,
    state: &'a mut SpaceState,
    /// Nodes that may have become unreachable
    candidates: BTreeSet<IdKey>,
    delta: StoreDelta,
    diff: Diff,
    cleared: bool,
}

impl<'a> Transaction<'a> {
    fn new(space: &'a Space, state: &'a mut SpaceState) -> Self {
        Self {
            space,
            state,
            candidates: BTreeSet::new(),
            delta: StoreDelta::new(),
            diff: Diff::new(),
            cleared: false,
        }
    }

    fn remember(&mut self, holder: &Holder, key: IdKey) {
        if self.state.holders.remember(holder, &key) {
            self.delta.add_holder(HolderPair::new(holder.clone(), key));
        }
    }

    fn forget(&mut self, holder: &Holder, key: IdKey) {
        if self.state.holders.forget(holder, &key) {
            self.delta
                .remove_holder(HolderPair::new(holder.clone(), key.clone()));
            self.candidates.insert(key);
        }
    }

    fn forget_all(&mut self, holder: &Holder) {
        for key in self.state.holders.forget_all(holder) {
            self.delta
                .remove_holder(HolderPair::new(holder.clone(), key.clone()));
            self.candidates.insert(key);
        }
    }

    /// Imprint rounds until rederivation stops producing changes
    fn imprint(&mut self, things: Vec<Thing>) -> Result<Diff> {
        let max_rounds = self.space.config.max_reactive_rounds;
        let mut diff = Diff::new();
        let mut input = things;
        let mut pending: Vec<String> = Vec::new();
        let mut rounds = 0;

        while !input.is_empty() {
            if rounds == max_rounds {
                warn!(rounds, pending = ?pending, "Rederivation did not converge");
                return Err(ReactiveLoopError { rounds, pending }.into());
            }
            rounds += 1;
            self.space.metrics.record_round();

            let (round, touched) = self.round(&input)?;
            self.diff.merge(round.clone());
            diff.merge(round.clone());

            let requests = self.space.reactions.resolve(&touched, &self.state.arena);
            input = Vec::new();
            pending.clear();
            for (key, fields) in &requests {
                let Some(current) = self.state.arena.build(key) else {
                    continue;
                };
                self.space.metrics.record_rederivation();
                let rederived =
                    self.space
                        .spec
                        .rederive(&current, fields, &round, &self.state.arena)?;
                if let Some(update) = rederived_fields(&current, &rederived, fields) {
                    trace!(key = %key, ?fields, "Rederived");
                    pending.extend(fields.iter().map(|field| format!("{key}.{field}")));
                    input.push(update);
                }
            }
        }

        debug!(rounds, changes = diff.len(), "Imprinted");
        Ok(diff)
    }

    /// Merge the input, rebuild everything it affected and classify changes
    fn round(&mut self, input: &[Thing]) -> Result<(Diff, Vec<Touched>)> {
        let mut records = Vec::new();
        for thing in input {
            records.extend(flatten(thing)?);
        }

        let mut changed = BTreeSet::new();
        for record in records {
            self.state
                .arena
                .apply(record, &mut changed, &mut self.candidates);
        }
        let affected = self.state.arena.propagate(&changed);

        let mut diff = Diff::new();
        let mut touched = Vec::new();
        for key in affected {
            let Some(latest) = self.state.arena.refresh(&key) else {
                continue;
            };
            let fields = match self.state.arena.commit(&key, latest.clone()) {
                None => {
                    self.candidates.insert(key.clone());
                    diff.record_added(key.clone(), latest.clone());
                    latest.field_names().map(str::to_string).collect()
                }
                Some(previous) if !previous.equals(&latest, Equality::State) => {
                    let fields = previous.changed_fields(&latest);
                    diff.record_changed(key.clone(), previous, latest.clone());
                    fields
                }
                Some(_) => continue,
            };
            touched.push(Touched {
                key: key.clone(),
                type_name: latest.type_name().to_string(),
                fields,
            });
            self.delta.add_thing(key, latest);
        }
        Ok((diff, touched))
    }

    /// Merge a restored thing without reactions or diffs
    fn absorb(&mut self, thing: &Thing, changed: &mut BTreeSet<IdKey>) -> Result<()> {
        for record in flatten(thing)? {
            self.state.arena.apply(record, changed, &mut self.candidates);
        }
        Ok(())
    }

    /// Commit builds of everything absorbed so later diffs start from them
    fn settle(&mut self, changed: &BTreeSet<IdKey>) {
        for key in self.state.arena.propagate(changed) {
            if let Some(latest) = self.state.arena.refresh(&key) {
                self.state.arena.commit(&key, latest);
            }
        }
    }

    fn clear(&mut self) {
        self.state.reset();
        self.candidates.clear();
        self.delta = StoreDelta::new();
        self.cleared = true;
        self.space.writer.submit(Job::Clear);
        info!("Space cleared");
    }

    /// Evict unheld candidates with no referrers, and unheld cycles
    ///
    /// A candidate that still has referrers goes only when nothing in its
    /// reverse-reachability closure is held; the closure then goes with it.
    fn cleanup(&mut self) -> usize {
        let mut evicted = 0;
        while let Some(key) = self.candidates.pop_first() {
            let arena = &self.state.arena;
            if !arena.contains(&key) || self.state.holders.is_held(&key) {
                continue;
            }
            let doomed = if arena.references().has_referrers(&key) {
                let closure = arena.referrer_closure(&key);
                if closure.iter().any(|k| self.state.holders.is_held(k)) {
                    continue;
                }
                closure
            } else {
                BTreeSet::from([key])
            };
            for key in doomed {
                if let Some(targets) = self.state.arena.evict(&key) {
                    trace!(key = %key, "Evicted");
                    evicted += 1;
                    self.candidates.extend(targets);
                    self.delta.remove_thing(key);
                }
            }
        }
        self.space.metrics.record_evictions(evicted as u64);
        evicted
    }

    fn finish(mut self, op: &'static str) {
        let evicted = self.cleanup();
        if let Some(session) = self.state.session.as_mut() {
            session.merge(std::mem::take(&mut self.diff));
        }
        let dirty = self.cleared || !self.delta.is_empty();
        if !self.delta.is_empty() {
            self.space
                .writer
                .submit(Job::Store(std::mem::take(&mut self.delta)));
        }
        if dirty {
            self.state.revision = self.state.revision.next();
        }
        debug!(op, evicted, revision = %self.state.revision, "Transaction finished");
    }
}

/// Identity of `current` carrying only the requested fields of `rederived`
///
/// Returns `None` when none of those fields is FLAT-different. Nested
/// entities in `current` are left out so stale copies of them never reach
/// the next round.
fn rederived_fields(
    current: &Thing,
    rederived: &Thing,
    fields: &BTreeSet<String>,
) -> Option<Thing> {
    let mut update = current.identity().to_builder();
    let mut changed = false;
    for field in fields {
        let Some(value) = rederived.get(field) else {
            continue;
        };
        if !current
            .get(field)
            .is_some_and(|old| old.equals(value, Equality::Flat))
        {
            changed = true;
        }
        update = update.set(field.clone(), value.clone());
    }
    changed.then(|| update.build())
}

fn identity_key(thing: &Thing) -> Result<IdKey> {
    thing.idkey().ok_or_else(|| {
        SpaceError::invalid(format!(
            "{thing} is not identifiable; only entities with all identity fields set can be held or looked up"
        ))
    })
}

fn identity_keys(things: &[Thing]) -> Result<Vec<IdKey>> {
    things.iter().map(identity_key).collect()
}
