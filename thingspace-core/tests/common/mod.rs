//! Shared fixtures for space integration tests

#![allow(dead_code)]

use std::sync::Arc;
use thingspace_core::prelude::*;
use thingspace_core::SpaceConfig;

pub fn schema() -> Schema {
    Schema::new()
        .with(ThingType::entity("Item", &["id"]))
        .with(ThingType::entity("Feed", &["id"]))
        .with(ThingType::entity("Node", &["id"]))
        .with(ThingType::entity("Fav", &["item"]))
        .with(ThingType::value("Meta"))
        .with(
            ThingType::entity("Stats", &["id"])
                .with_reaction(ReactionRule::derive(&["total"]).when(Trigger::on_type("Item"))),
        )
        .with(ThingType::entity("Card", &["id"]).with_reaction(
            ReactionRule::derive(&["label"]).when(Trigger::on_instance_field("item", "title")),
        ))
        .with(
            ThingType::entity("Counter", &["id"])
                .with_reaction(ReactionRule::derive(&["n"]).when(Trigger::own("n"))),
        )
}

pub fn spec() -> SchemaSpec {
    SchemaSpec::new(schema())
        .deriving("Stats", "total", |_, selector| {
            Ok(Value::Int(selector.get_all("Item").len() as i64))
        })
        .deriving("Card", "label", |card, _| {
            let title = card
                .get("item")
                .and_then(Value::as_thing)
                .and_then(|item| item.get("title"))
                .and_then(Value::as_text)
                .ok_or_else(|| "linked item has no title".to_string())?;
            Ok(Value::from(title.to_uppercase()))
        })
        .deriving("Counter", "n", |counter, _| {
            let n = counter.get("n").and_then(Value::as_int).unwrap_or(0);
            Ok(Value::Int(n + 1))
        })
}

pub fn space() -> Space {
    Space::builder(Arc::new(spec())).build().unwrap()
}

pub fn space_with(storage: Arc<MemoryStorage>) -> Space {
    Space::builder(Arc::new(spec()))
        .storage(storage)
        .build()
        .unwrap()
}

pub fn space_with_config(config: SpaceConfig) -> Space {
    Space::builder(Arc::new(spec())).config(config).build().unwrap()
}

pub fn thing(space: &Space, type_name: &str, id: &str) -> ThingBuilder {
    let field = if type_name == "Fav" { "item" } else { "id" };
    space.schema().thing(type_name).unwrap().set(field, id)
}

pub fn item(space: &Space, id: &str, title: &str) -> Thing {
    thing(space, "Item", id).set("title", title).build()
}

/// Text of `field` in the current state of `of`
pub fn text(space: &Space, of: &Thing, field: &str) -> Option<String> {
    space
        .get(of)
        .unwrap()?
        .get(field)
        .and_then(Value::as_text)
        .map(str::to_string)
}

pub use thingspace_core::ThingBuilder;
