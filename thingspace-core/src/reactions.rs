//! Declarative reaction tables
//!
//! Every [`ThingType`](crate::thing::ThingType) carries a static list of
//! [`ReactionRule`]s: "these derived fields of mine depend on that kind of
//! change". [`Reactions`] indexes the rules of a whole schema by what they
//! watch and resolves a round's changes into concrete rederivation requests.

use crate::schema::Schema;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thingspace_types::IdKey;

/// What a derived field reacts to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// Any change to any instance of the type
    Type(String),

    /// A change to a specific field of any instance of the type
    TypeField { type_name: String, field: String },

    /// Any change to the instance the reactor links through its field `via`
    Instance { via: String },

    /// A change to `field` of the instance linked through `via`
    InstanceField { via: String, field: String },

    /// A change to another instance of the reactor's own type
    Siblings,

    /// A change to one of the reactor's own fields
    Own(String),
}

impl Trigger {
    pub fn on_type(type_name: impl Into<String>) -> Self {
        Trigger::Type(type_name.into())
    }

    pub fn on_field(type_name: impl Into<String>, field: impl Into<String>) -> Self {
        Trigger::TypeField {
            type_name: type_name.into(),
            field: field.into(),
        }
    }

    pub fn on_instance(via: impl Into<String>) -> Self {
        Trigger::Instance { via: via.into() }
    }

    pub fn on_instance_field(via: impl Into<String>, field: impl Into<String>) -> Self {
        Trigger::InstanceField {
            via: via.into(),
            field: field.into(),
        }
    }

    pub fn siblings() -> Self {
        Trigger::Siblings
    }

    pub fn own(field: impl Into<String>) -> Self {
        Trigger::Own(field.into())
    }
}

/// Derived fields and the triggers that make them stale
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionRule {
    derives: Vec<String>,
    triggers: Vec<Trigger>,
}

impl ReactionRule {
    /// Start a rule for the given derived fields
    pub fn derive(fields: &[&str]) -> Self {
        Self {
            derives: fields.iter().map(|f| f.to_string()).collect(),
            triggers: Vec::new(),
        }
    }

    pub fn when(mut self, trigger: Trigger) -> Self {
        self.triggers.push(trigger);
        self
    }

    pub fn derives(&self) -> &[String] {
        &self.derives
    }

    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }
}

/// An entity that changed during one imprint round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Touched {
    pub key: IdKey,
    pub type_name: String,
    /// Fields whose declared value differs from the previous build
    pub fields: BTreeSet<String>,
}

/// Rederivation requests: entity key to the fields to recompute
pub type Requests = BTreeMap<IdKey, BTreeSet<String>>;

/// Read access the resolver needs from the graph
pub trait ReactionGraph {
    /// Keys of every live instance of a type
    fn instances_of(&self, type_name: &str) -> Vec<IdKey>;

    /// Keys of nodes holding an edge to `key`
    fn referrers_of(&self, key: &IdKey) -> Vec<IdKey>;

    fn type_of(&self, key: &IdKey) -> Option<String>;

    /// Whether `from` links `to` through its field `field`
    fn links_via(&self, from: &IdKey, field: &str, to: &IdKey) -> bool;
}

#[derive(Debug, Clone)]
struct Entry {
    reactor: String,
    derives: Vec<String>,
    trigger: Trigger,
}

/// Index of reaction rules by what they watch
#[derive(Debug, Clone, Default)]
pub struct Reactions {
    /// `Type` and `TypeField` triggers, keyed by the watched type
    by_watched_type: HashMap<String, Vec<Entry>>,

    /// `Instance` and `InstanceField` triggers
    linked: Vec<Entry>,

    /// `Siblings` and `Own` triggers, keyed by the reactor's type
    by_own_type: HashMap<String, Vec<Entry>>,
}

impl Reactions {
    pub fn from_schema(schema: &Schema) -> Self {
        let mut reactions = Reactions::default();
        for kind in schema.types() {
            for rule in kind.reactions() {
                for trigger in rule.triggers() {
                    let entry = Entry {
                        reactor: kind.name().to_string(),
                        derives: rule.derives().to_vec(),
                        trigger: trigger.clone(),
                    };
                    match trigger {
                        Trigger::Type(watched) | Trigger::TypeField { type_name: watched, .. } => {
                            reactions
                                .by_watched_type
                                .entry(watched.clone())
                                .or_default()
                                .push(entry);
                        }
                        Trigger::Instance { .. } | Trigger::InstanceField { .. } => {
                            reactions.linked.push(entry);
                        }
                        Trigger::Siblings | Trigger::Own(_) => {
                            reactions
                                .by_own_type
                                .entry(kind.name().to_string())
                                .or_default()
                                .push(entry);
                        }
                    }
                }
            }
        }
        reactions
    }

    pub fn is_empty(&self) -> bool {
        self.by_watched_type.is_empty() && self.linked.is_empty() && self.by_own_type.is_empty()
    }

    /// Types whose derived fields react to changes of `type_name`
    pub fn reactors_of(&self, type_name: &str) -> BTreeSet<&str> {
        let mut reactors: BTreeSet<&str> = self
            .by_watched_type
            .get(type_name)
            .into_iter()
            .flatten()
            .map(|e| e.reactor.as_str())
            .collect();
        if let Some(own) = self.by_own_type.get(type_name) {
            reactors.extend(own.iter().map(|e| e.reactor.as_str()));
        }
        reactors
    }

    /// Resolve a round's changes into concrete `(instance, fields)` requests
    pub fn resolve(&self, touched: &[Touched], graph: &dyn ReactionGraph) -> Requests {
        let mut requests = Requests::new();
        let mut request = |key: IdKey, derives: &[String]| {
            requests
                .entry(key)
                .or_default()
                .extend(derives.iter().cloned());
        };

        for change in touched {
            for entry in self.by_watched_type.get(&change.type_name).into_iter().flatten() {
                let fires = match &entry.trigger {
                    Trigger::TypeField { field, .. } => change.fields.contains(field),
                    _ => true,
                };
                if fires {
                    for reactor in graph.instances_of(&entry.reactor) {
                        request(reactor, &entry.derives);
                    }
                }
            }

            if !self.linked.is_empty() {
                let referrers = graph.referrers_of(&change.key);
                for entry in &self.linked {
                    let (via, field) = match &entry.trigger {
                        Trigger::Instance { via } => (via, None),
                        Trigger::InstanceField { via, field } => (via, Some(field)),
                        _ => continue,
                    };
                    if field.is_some_and(|f| !change.fields.contains(f)) {
                        continue;
                    }
                    for referrer in &referrers {
                        if graph.type_of(referrer).as_deref() == Some(entry.reactor.as_str())
                            && graph.links_via(referrer, via, &change.key)
                        {
                            request(referrer.clone(), &entry.derives);
                        }
                    }
                }
            }

            for entry in self.by_own_type.get(&change.type_name).into_iter().flatten() {
                match &entry.trigger {
                    Trigger::Siblings => {
                        for sibling in graph.instances_of(&entry.reactor) {
                            if sibling != change.key {
                                request(sibling, &entry.derives);
                            }
                        }
                    }
                    Trigger::Own(field) if change.fields.contains(field) => {
                        request(change.key.clone(), &entry.derives);
                    }
                    _ => {}
                }
            }
        }

        requests
    }
}
