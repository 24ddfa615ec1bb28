//! A space persisting to a snapshot file survives a restart

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use thingspace_core::prelude::*;
use thingspace_store::{load_snapshot, JsonFileStorage};

const WAIT: Duration = Duration::from_secs(5);

fn spec() -> Arc<SchemaSpec> {
    let schema = Schema::new()
        .with(ThingType::entity("Item", &["id"]))
        .with(ThingType::entity("Feed", &["id"]));
    Arc::new(SchemaSpec::new(schema))
}

fn open(path: &std::path::Path) -> Space {
    Space::builder(spec())
        .storage(Arc::new(JsonFileStorage::new(path)))
        .build()
        .unwrap()
}

fn feed(space: &Space, titles: &[(&str, &str)]) -> Thing {
    let items: Vec<Value> = titles
        .iter()
        .map(|(id, title)| {
            space
                .schema()
                .thing("Item")
                .unwrap()
                .set("id", *id)
                .set("title", *title)
                .build()
                .into()
        })
        .collect();
    space
        .schema()
        .thing("Feed")
        .unwrap()
        .set("id", "home")
        .set("items", items)
        .build()
}

#[test]
fn test_space_survives_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("space.json");
    let saves = Holder::persistent("saves");

    let first = open(&path);
    let home = feed(&first, &[("a", "A"), ("b", "B")]);
    first.remember(&saves, &[home.clone()]).unwrap();
    first.imprint(&home).unwrap();
    assert!(first.await_writes(WAIT));
    first.release();

    let second = open(&path);
    assert_eq!(second.count(None).unwrap(), 3);
    let restored = second.get(&home).unwrap().unwrap();
    assert!(restored.equals(&home, Equality::State));
    assert!(second.imprint(&home).unwrap().is_empty());
}

#[test]
fn test_evicted_children_leave_the_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("space.json");
    let saves = Holder::persistent("saves");
    let space = open(&path);

    let home = feed(&space, &[("a", "A"), ("b", "B")]);
    space.remember(&saves, &[home.clone()]).unwrap();
    space.imprint(&home).unwrap();
    space.imprint(&feed(&space, &[("b", "B")])).unwrap();
    assert!(space.await_writes(WAIT));

    let stored = load_snapshot(&path).unwrap().unwrap().state;
    let keys: Vec<String> = stored.things.keys().map(|k| k.to_string()).collect();
    insta::assert_debug_snapshot!(keys, @r###"
    [
        "Feed{id=\"home\"}",
        "Item{id=\"b\"}",
    ]
    "###);
}

#[test]
fn test_clear_deletes_the_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("space.json");
    let space = open(&path);
    let home = feed(&space, &[("a", "A")]);
    space.remember(&Holder::persistent("saves"), &[home.clone()]).unwrap();
    space.imprint(&home).unwrap();
    assert!(space.await_writes(WAIT));
    assert!(path.exists());

    space.clear().unwrap();
    assert!(space.await_writes(WAIT));

    assert!(!path.exists());
    space.release();
    assert_eq!(open(&path).count(None).unwrap(), 0);
}

#[test]
fn test_corrupt_file_poisons_space() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("space.json");
    std::fs::write(&path, r#"{"version": 7, "saved_at": "2024-01-01T00:00:00Z", "state": {}}"#)
        .unwrap();

    let space = open(&path);

    let err = space.count(None).unwrap_err();
    assert!(err.to_string().contains("snapshot version 7"), "{err}");
}
