//! Serializable forms of things
//!
//! Things hold a shared type descriptor, so storage backends persist these
//! records instead and resolve type names against a [`Schema`] on restore.

use crate::schema::Schema;
use crate::thing::{Thing, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("Unknown thing type: {0}")]
    UnknownType(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThingRecord {
    #[serde(rename = "type")]
    pub type_name: String,
    pub fields: BTreeMap<String, ValueRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueRecord {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    List(Vec<ValueRecord>),
    Thing(ThingRecord),
}

impl From<&Thing> for ThingRecord {
    fn from(thing: &Thing) -> Self {
        ThingRecord {
            type_name: thing.type_name().to_string(),
            fields: thing
                .fields()
                .map(|(name, value)| (name.to_string(), ValueRecord::from(value)))
                .collect(),
        }
    }
}

impl From<&Value> for ValueRecord {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => ValueRecord::Null,
            Value::Bool(b) => ValueRecord::Bool(*b),
            Value::Int(i) => ValueRecord::Int(*i),
            Value::Text(s) => ValueRecord::Text(s.clone()),
            Value::List(items) => ValueRecord::List(items.iter().map(ValueRecord::from).collect()),
            Value::Thing(t) => ValueRecord::Thing(ThingRecord::from(t)),
        }
    }
}

impl ThingRecord {
    /// Resolve the record against a schema
    pub fn into_thing(self, schema: &Schema) -> Result<Thing, RecordError> {
        let kind = schema
            .get(&self.type_name)
            .ok_or_else(|| RecordError::UnknownType(self.type_name.clone()))?;
        let mut builder = Thing::builder(kind);
        for (name, value) in self.fields {
            builder = builder.set(name, value.into_value(schema)?);
        }
        Ok(builder.build())
    }
}

impl ValueRecord {
    pub fn into_value(self, schema: &Schema) -> Result<Value, RecordError> {
        Ok(match self {
            ValueRecord::Null => Value::Null,
            ValueRecord::Bool(b) => Value::Bool(b),
            ValueRecord::Int(i) => Value::Int(i),
            ValueRecord::Text(s) => Value::Text(s),
            ValueRecord::List(items) => Value::List(
                items
                    .into_iter()
                    .map(|item| item.into_value(schema))
                    .collect::<Result<_, _>>()?,
            ),
            ValueRecord::Thing(record) => Value::Thing(record.into_thing(schema)?),
        })
    }
}
