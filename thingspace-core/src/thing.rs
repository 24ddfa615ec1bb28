//! Immutable things and their equality model
//!
//! A [`Thing`] is one domain entity or value object. It only carries the
//! fields that were explicitly declared; an absent field is *undeclared*,
//! which is different from a field declared as [`Value::Null`].
//!
//! Things of a type with identity fields are *identifiable*: their identity
//! key names one entity in the space no matter what the rest of their state
//! says. Things of a type without identity fields are plain values.

use crate::reactions::ReactionRule;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use thingspace_types::IdKey;

/// Comparison modes available on the same thing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Equality {
    /// Only identity-defining fields. Default `==` and `Hash` use this.
    Identity,

    /// All declared fields on both sides; a field declared on one side only
    /// makes the things different.
    State,

    /// Only fields declared on both sides are compared.
    StateDeclared,

    /// State, but directly nested identifiable things only compare identity.
    Flat,
}

/// Field value
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    List(Vec<Value>),
    Thing(Thing),
}

impl Value {
    /// Compare two values under an equality mode
    pub fn equals(&self, other: &Value, mode: Equality) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equals(y, mode))
            }
            (Value::Thing(a), Value::Thing(b)) => match mode {
                Equality::Flat if a.is_identifiable() => a.equals(b, Equality::Identity),
                mode => a.equals(b, mode),
            },
            _ => false,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_thing(&self) -> Option<&Thing> {
        match self {
            Value::Thing(t) => Some(t),
            _ => None,
        }
    }

    fn write_canonical(&self, out: &mut String) {
        match self {
            Value::Null => out.push_str("null"),
            Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Value::Int(i) => out.push_str(&i.to_string()),
            Value::Text(s) => out.push_str(&format!("{s:?}")),
            Value::List(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.write_canonical(out);
                }
                out.push(']');
            }
            Value::Thing(t) => match t.idkey() {
                Some(key) => out.push_str(key.as_str()),
                None => t.write_canonical_state(out),
            },
        }
    }
}

/// Compares under [`Equality::State`]
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other, Equality::State)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Thing> for Value {
    fn from(t: Thing) -> Self {
        Value::Thing(t)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Entity or value type descriptor
///
/// Stands in for generated entity classes: a name, the ordered identity
/// fields (empty for value types) and a static table of reaction rules.
#[derive(Debug, Clone)]
pub struct ThingType {
    name: String,
    identity: Vec<String>,
    reactions: Vec<ReactionRule>,
}

impl ThingType {
    /// An identifiable entity type keyed by `identity` fields
    pub fn entity(name: impl Into<String>, identity: &[&str]) -> Self {
        Self {
            name: name.into(),
            identity: identity.iter().map(|f| f.to_string()).collect(),
            reactions: Vec::new(),
        }
    }

    /// A non-identifiable value type
    pub fn value(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identity: Vec::new(),
            reactions: Vec::new(),
        }
    }

    /// Declare a derived field and what it reacts to
    pub fn with_reaction(mut self, rule: ReactionRule) -> Self {
        self.reactions.push(rule);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identity_fields(&self) -> &[String] {
        &self.identity
    }

    pub fn reactions(&self) -> &[ReactionRule] {
        &self.reactions
    }

    /// Whether instances of this type carry an identity
    pub fn has_identity(&self) -> bool {
        !self.identity.is_empty()
    }

    pub fn is_identity_field(&self, field: &str) -> bool {
        self.identity.iter().any(|f| f == field)
    }
}

/// Immutable entity or value
#[derive(Clone)]
pub struct Thing {
    kind: Arc<ThingType>,
    fields: BTreeMap<String, Value>,
}

impl Thing {
    pub fn builder(kind: &Arc<ThingType>) -> ThingBuilder {
        ThingBuilder {
            kind: Arc::clone(kind),
            fields: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> &Arc<ThingType> {
        &self.kind
    }

    pub fn type_name(&self) -> &str {
        self.kind.name()
    }

    /// Declared value of a field, `None` when undeclared
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn is_declared(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Declared fields in name order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// True when the type has identity fields and all of them are declared
    pub fn is_identifiable(&self) -> bool {
        self.kind.has_identity()
            && self
                .kind
                .identity_fields()
                .iter()
                .all(|f| matches!(self.fields.get(f), Some(v) if !v.is_null()))
    }

    /// Identity key, for identifiable things only
    pub fn idkey(&self) -> Option<IdKey> {
        if !self.is_identifiable() {
            return None;
        }
        let mut out = String::new();
        out.push_str(self.type_name());
        out.push('{');
        for (i, field) in self.kind.identity_fields().iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(field);
            out.push('=');
            if let Some(value) = self.fields.get(field) {
                value.write_canonical(&mut out);
            }
        }
        out.push('}');
        Some(IdKey(out))
    }

    /// Identity key for identifiable things, content key for values
    ///
    /// Value keys hash the canonical state so two equal values share a key.
    pub fn key(&self) -> IdKey {
        match self.idkey() {
            Some(key) => key,
            None => {
                let mut state = String::new();
                self.write_canonical_state(&mut state);
                let hash = blake3::hash(state.as_bytes());
                IdKey(format!("{}#{}", self.type_name(), &hash.to_hex()[..16]))
            }
        }
    }

    /// Only the identity fields, or the whole value for non-identifiable things
    pub fn identity(&self) -> Thing {
        if !self.is_identifiable() {
            return self.clone();
        }
        let fields = self
            .kind
            .identity_fields()
            .iter()
            .filter_map(|f| self.fields.get(f).map(|v| (f.clone(), v.clone())))
            .collect();
        Thing {
            kind: Arc::clone(&self.kind),
            fields,
        }
    }

    /// Compare under one of the four equality modes
    pub fn equals(&self, other: &Thing, mode: Equality) -> bool {
        if self.type_name() != other.type_name() {
            return false;
        }
        match mode {
            Equality::Identity if self.kind.has_identity() => {
                self.kind.identity_fields().iter().all(|f| {
                    match (self.fields.get(f), other.fields.get(f)) {
                        (Some(a), Some(b)) => a.equals(b, Equality::Identity),
                        (None, None) => true,
                        _ => false,
                    }
                })
            }
            Equality::Identity => self.equals(other, Equality::State),
            Equality::State | Equality::Flat => {
                self.fields.len() == other.fields.len()
                    && self.fields.iter().all(|(name, value)| {
                        other
                            .fields
                            .get(name)
                            .is_some_and(|theirs| value.equals(theirs, mode))
                    })
            }
            Equality::StateDeclared => self.fields.iter().all(|(name, value)| {
                other
                    .fields
                    .get(name)
                    .map_or(true, |theirs| value.equals(theirs, Equality::StateDeclared))
            }),
        }
    }

    /// Fields declared on one side only or with state-different values
    pub fn changed_fields(&self, other: &Thing) -> BTreeSet<String> {
        let mut changed: BTreeSet<String> = self
            .fields
            .iter()
            .filter(|(name, value)| {
                other
                    .fields
                    .get(*name)
                    .map_or(true, |theirs| !value.equals(theirs, Equality::State))
            })
            .map(|(name, _)| name.clone())
            .collect();
        changed.extend(
            other
                .fields
                .keys()
                .filter(|name| !self.fields.contains_key(*name))
                .cloned(),
        );
        changed
    }

    /// Declared fields of `over` applied on top of this thing
    pub fn merge(&self, over: &Thing) -> Thing {
        let mut merged = self.clone();
        for (name, value) in &over.fields {
            merged.fields.insert(name.clone(), value.clone());
        }
        merged
    }

    pub fn to_builder(&self) -> ThingBuilder {
        ThingBuilder {
            kind: Arc::clone(&self.kind),
            fields: self.fields.clone(),
        }
    }

    fn write_canonical_state(&self, out: &mut String) {
        out.push_str(self.type_name());
        out.push('{');
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(name);
            out.push('=');
            value.write_canonical(out);
        }
        out.push('}');
    }
}

impl PartialEq for Thing {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other, Equality::Identity)
    }
}

impl Eq for Thing {}

impl Hash for Thing {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash_projection(state, true);
    }
}

impl Thing {
    /// Hashes exactly what `equals(Identity)` (or `equals(State)`) compares
    fn hash_projection<H: Hasher>(&self, state: &mut H, identity: bool) {
        self.type_name().hash(state);
        if identity && self.kind.has_identity() {
            for field in self.kind.identity_fields() {
                match self.fields.get(field) {
                    Some(value) => {
                        1u8.hash(state);
                        value.hash_projection(state, true);
                    }
                    None => 0u8.hash(state),
                }
            }
            return;
        }
        self.fields.len().hash(state);
        for (name, value) in &self.fields {
            name.hash(state);
            value.hash_projection(state, false);
        }
    }
}

impl Value {
    fn hash_projection<H: Hasher>(&self, state: &mut H, identity: bool) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Text(s) => s.hash(state),
            Value::List(items) => {
                items.len().hash(state);
                for item in items {
                    item.hash_projection(state, identity);
                }
            }
            Value::Thing(t) => t.hash_projection(state, identity),
        }
    }
}

impl fmt::Debug for Thing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(self.type_name());
        for (name, value) in &self.fields {
            s.field(name, value);
        }
        s.finish()
    }
}

impl fmt::Display for Thing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.write_canonical_state(&mut out);
        f.write_str(&out)
    }
}

/// Builder producing a new [`Thing`]
#[derive(Debug, Clone)]
pub struct ThingBuilder {
    kind: Arc<ThingType>,
    fields: BTreeMap<String, Value>,
}

impl ThingBuilder {
    /// Declare a field
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Make a field undeclared again
    pub fn unset(mut self, field: &str) -> Self {
        self.fields.remove(field);
        self
    }

    pub fn build(self) -> Thing {
        Thing {
            kind: self.kind,
            fields: self.fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> Arc<ThingType> {
        Arc::new(ThingType::entity("Item", &["id"]))
    }

    fn tag() -> Arc<ThingType> {
        Arc::new(ThingType::value("Tag"))
    }

    #[test]
    fn test_identity_ignores_state() {
        let a = Thing::builder(&item()).set("id", "x").set("title", "A").build();
        let b = Thing::builder(&item()).set("id", "x").set("title", "B").build();

        assert!(a.equals(&b, Equality::Identity));
        assert!(!a.equals(&b, Equality::State));
        assert_eq!(a, b);
    }

    #[test]
    fn test_state_distinguishes_undeclared() {
        let a = Thing::builder(&item()).set("id", "x").build();
        let b = Thing::builder(&item()).set("id", "x").set("title", Value::Null).build();

        assert!(!a.equals(&b, Equality::State));
        assert!(a.equals(&b, Equality::StateDeclared));
    }

    #[test]
    fn test_state_declared_compares_common_fields() {
        let a = Thing::builder(&item()).set("id", "x").set("title", "A").build();
        let b = Thing::builder(&item()).set("id", "x").set("count", 3).build();
        let c = Thing::builder(&item()).set("id", "x").set("title", "C").build();

        assert!(a.equals(&b, Equality::StateDeclared));
        assert!(!a.equals(&c, Equality::StateDeclared));
    }

    #[test]
    fn test_flat_ignores_nested_identifiable_state() {
        let child_a = Thing::builder(&item()).set("id", "c").set("title", "old").build();
        let child_b = Thing::builder(&item()).set("id", "c").set("title", "new").build();
        let parent = Arc::new(ThingType::entity("List", &["id"]));
        let p1 = Thing::builder(&parent).set("id", "p").set("first", child_a).build();
        let p2 = Thing::builder(&parent).set("id", "p").set("first", child_b).build();

        assert!(p1.equals(&p2, Equality::Flat));
        assert!(!p1.equals(&p2, Equality::State));
    }

    #[test]
    fn test_flat_recurses_into_values() {
        let parent = item();
        let t1 = Thing::builder(&tag()).set("label", "a").build();
        let t2 = Thing::builder(&tag()).set("label", "b").build();
        let p1 = Thing::builder(&parent).set("id", "p").set("tag", t1).build();
        let p2 = Thing::builder(&parent).set("id", "p").set("tag", t2).build();

        assert!(!p1.equals(&p2, Equality::Flat));
    }

    #[test]
    fn test_idkey_format() {
        let a = Thing::builder(&item()).set("id", "x").set("title", "A").build();
        insta::assert_snapshot!(a.idkey().unwrap().as_str(), @r#"Item{id="x"}"#);
    }

    #[test]
    fn test_missing_identity_is_not_identifiable() {
        let a = Thing::builder(&item()).set("title", "A").build();
        assert!(!a.is_identifiable());
        assert!(a.idkey().is_none());
    }

    #[test]
    fn test_value_keys_follow_state() {
        let a = Thing::builder(&tag()).set("label", "a").build();
        let b = Thing::builder(&tag()).set("label", "a").build();
        let c = Thing::builder(&tag()).set("label", "c").build();

        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), c.key());
        assert!(a.key().as_str().starts_with("Tag#"));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_merge_keeps_undeclared() {
        let base = Thing::builder(&item()).set("id", "x").set("val", 5).build();
        let over = Thing::builder(&item()).set("id", "x").set("title", "T").build();
        let merged = base.merge(&over);

        assert_eq!(merged.get("val"), Some(&Value::Int(5)));
        assert_eq!(merged.get("title"), Some(&Value::from("T")));
    }

    #[test]
    fn test_changed_fields() {
        let a = Thing::builder(&item()).set("id", "x").set("title", "A").set("n", 1).build();
        let b = Thing::builder(&item()).set("id", "x").set("title", "B").set("extra", true).build();

        let changed: Vec<String> = a.changed_fields(&b).into_iter().collect();
        assert_eq!(changed, vec!["extra", "n", "title"]);
        assert!(a.changed_fields(&a).is_empty());
    }

    #[test]
    fn test_identity_projection() {
        let a = Thing::builder(&item()).set("id", "x").set("title", "A").build();
        let id = a.identity();
        assert!(id.is_declared("id"));
        assert!(!id.is_declared("title"));
    }

    #[test]
    fn test_hash_matches_identity() {
        use std::collections::HashSet;

        let a = Thing::builder(&item()).set("id", "x").set("title", "A").build();
        let b = Thing::builder(&item()).set("id", "x").set("title", "B").build();
        let set: HashSet<Thing> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_hash_matches_identity_without_identity_fields() {
        use std::collections::HashSet;

        let a = Thing::builder(&item()).set("title", "A").build();
        let b = Thing::builder(&item()).set("title", "B").build();
        let c = Thing::builder(&item()).set("id", Value::Null).set("title", "C").build();
        let d = Thing::builder(&item()).set("id", Value::Null).build();
        assert_eq!(a, b);
        assert_eq!(c, d);
        assert_ne!(a, c);

        let set: HashSet<Thing> = [a, b, c, d].into_iter().collect();
        assert_eq!(set.len(), 2);
    }
}
