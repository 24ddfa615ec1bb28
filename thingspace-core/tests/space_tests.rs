//! Integration tests for retention, merging, cleanup and diff sessions

mod common;

use common::{item, space, text, thing};
use std::sync::Arc;
use std::thread;
use thingspace_core::prelude::*;
use thingspace_core::SpaceError;

#[test]
fn test_identity_vs_state() {
    let space = space();
    let a = item(&space, "x", "A");
    let b = item(&space, "x", "B");

    assert!(a.equals(&b, Equality::Identity));
    assert!(!a.equals(&b, Equality::State));
}

#[test]
fn test_undeclared_fields_never_erase() {
    let space = space();
    let h = Holder::persistent("h");
    let bare = thing(&space, "Item", "1").build();
    space.remember(&h, &[bare.clone()]).unwrap();

    space.imprint(&bare).unwrap();
    space.imprint(&thing(&space, "Item", "1").set("val", 5).build()).unwrap();
    space.imprint(&bare).unwrap();

    let current = space.get(&bare).unwrap().unwrap();
    assert_eq!(current.get("val"), Some(&Value::Int(5)));
}

#[test]
fn test_declared_null_overwrites() {
    let space = space();
    let h = Holder::persistent("h");
    let x = item(&space, "x", "A");
    space.remember(&h, &[x.clone()]).unwrap();
    space.imprint(&x).unwrap();

    space
        .imprint(&thing(&space, "Item", "x").set("title", Value::Null).build())
        .unwrap();

    assert_eq!(space.get(&x).unwrap().unwrap().get("title"), Some(&Value::Null));
}

#[test]
fn test_forget_evicts_unreferenced() {
    let space = space();
    let h = Holder::persistent("h");
    let a = item(&space, "a", "A");

    space.remember(&h, &[a.clone()]).unwrap();
    space.imprint(&a).unwrap();
    assert!(space.get(&a).unwrap().is_some());

    space.forget(&h, &[a.clone()]).unwrap();
    assert!(space.get(&a).unwrap().is_none());
}

#[test]
fn test_remember_before_imprint_keeps_entity() {
    let space = space();
    let h = Holder::session("h");
    let a = item(&space, "a", "A");

    space.remember(&h, &[a.clone()]).unwrap();
    assert_eq!(space.contains(&[a.clone()]).unwrap(), vec![false]);

    space.imprint(&a).unwrap();
    assert_eq!(space.contains(&[a]).unwrap(), vec![true]);
}

#[test]
fn test_retention_via_reference() {
    let space = space();
    let h = Holder::persistent("h");
    let child = item(&space, "c", "A");
    let parent = thing(&space, "Feed", "p").set("top", child.clone()).build();
    space.remember(&h, &[parent.clone()]).unwrap();
    space.imprint(&parent).unwrap();

    space.imprint(&item(&space, "c", "B")).unwrap();

    let built = space.get(&parent).unwrap().unwrap();
    let top = built.get("top").and_then(Value::as_thing).unwrap();
    assert_eq!(top.get("title"), Some(&Value::from("B")));
    assert_eq!(text(&space, &child, "title").as_deref(), Some("B"));
}

#[test]
fn test_unlinked_child_is_collected() {
    let space = space();
    let h = Holder::persistent("h");
    let parent = thing(&space, "Feed", "p")
        .set("top", item(&space, "c", "A"))
        .build();
    space.remember(&h, &[parent.clone()]).unwrap();
    space.imprint(&parent).unwrap();
    assert_eq!(space.count(Some("Item")).unwrap(), 1);

    space
        .imprint(&thing(&space, "Feed", "p").set("top", item(&space, "d", "D")).build())
        .unwrap();

    let items: Vec<String> = space
        .get_all("Item")
        .unwrap()
        .iter()
        .filter_map(|t| t.get("id").and_then(Value::as_text).map(str::to_string))
        .collect();
    assert_eq!(items, vec!["d"]);
}

#[test]
fn test_lists_link_every_entity() {
    let space = space();
    let h = Holder::persistent("h");
    let feed = thing(&space, "Feed", "f")
        .set(
            "items",
            vec![
                Value::from(item(&space, "a", "A")),
                Value::from(item(&space, "b", "B")),
            ],
        )
        .build();
    space.remember(&h, &[feed.clone()]).unwrap();
    space.imprint(&feed).unwrap();
    assert_eq!(space.count(Some("Item")).unwrap(), 2);

    space.forget(&h, &[feed]).unwrap();
    assert_eq!(space.count(None).unwrap(), 0);
}

#[test]
fn test_idempotent_imprint() {
    let space = space();
    let h = Holder::persistent("h");
    let x = item(&space, "x", "A");
    space.remember(&h, &[x.clone()]).unwrap();

    let first = space.imprint(&x).unwrap();
    let second = space.imprint(&x).unwrap();

    assert_eq!(first.len(), 1);
    assert!(second.is_empty());
}

#[test]
fn test_cycle_is_collected() {
    let space = space();
    let h = Holder::persistent("h");
    let a_ref = thing(&space, "Node", "a").build();
    let b = thing(&space, "Node", "b").set("next", a_ref).build();
    let a = thing(&space, "Node", "a").set("next", b.clone()).build();
    space.remember(&h, &[a.clone()]).unwrap();
    space.imprint(&a).unwrap();
    assert_eq!(space.count(Some("Node")).unwrap(), 2);

    space.forget(&h, &[a.clone()]).unwrap();

    assert!(space.get(&a).unwrap().is_none());
    assert!(space.get(&b).unwrap().is_none());
}

#[test]
fn test_cycle_held_from_inside_survives() {
    let space = space();
    let h = Holder::persistent("h");
    let g = Holder::persistent("g");
    let a_ref = thing(&space, "Node", "a").build();
    let b = thing(&space, "Node", "b").set("next", a_ref).build();
    let a = thing(&space, "Node", "a").set("next", b.clone()).build();
    space.remember(&h, &[a.clone()]).unwrap();
    space.remember(&g, &[b.clone()]).unwrap();
    space.imprint(&a).unwrap();

    space.forget(&h, &[a.clone()]).unwrap();

    assert!(space.get(&a).unwrap().is_some());
    let built = space.get(&b).unwrap().unwrap();
    let next = built.get("next").and_then(Value::as_thing).unwrap();
    assert_eq!(next.idkey(), a.idkey());
}

#[test]
fn test_inline_values_stay_with_owner() {
    let space = space();
    let h = Holder::persistent("h");
    let meta = space.schema().thing("Meta").unwrap().set("lang", "en").build();
    let x = thing(&space, "Item", "x").set("meta", meta).build();
    space.remember(&h, &[x.clone()]).unwrap();
    space.imprint(&x).unwrap();

    let update = space.schema().thing("Meta").unwrap().set("size", 3).build();
    space
        .imprint(&thing(&space, "Item", "x").set("meta", update).build())
        .unwrap();

    let built = space.get(&x).unwrap().unwrap();
    let meta = built.get("meta").and_then(Value::as_thing).unwrap();
    assert_eq!(meta.get("lang"), Some(&Value::from("en")));
    assert_eq!(meta.get("size"), Some(&Value::Int(3)));
    assert_eq!(space.count(None).unwrap(), 1);
}

#[test]
fn test_invalid_input_is_rejected() {
    let space = space();
    let meta = space.schema().thing("Meta").unwrap().set("lang", "en").build();
    let anonymous = space.schema().thing("Item").unwrap().set("title", "T").build();

    assert!(matches!(space.imprint(&meta), Err(SpaceError::InvalidArgument(_))));
    assert!(matches!(space.get(&anonymous), Err(SpaceError::InvalidArgument(_))));
    assert!(matches!(
        space.remember(&Holder::session("h"), &[anonymous]),
        Err(SpaceError::InvalidArgument(_))
    ));
}

#[test]
fn test_rejected_batch_changes_nothing() {
    let space = space();
    let h = Holder::persistent("h");
    let good = item(&space, "a", "A");
    let bad = thing(&space, "Feed", "f")
        .set("top", space.schema().thing("Item").unwrap().set("title", "no id").build())
        .build();
    space.remember(&h, &[good.clone()]).unwrap();

    assert!(space.imprint_all([good.clone(), bad]).is_err());
    assert!(space.get(&good).unwrap().is_none());
}

#[test]
fn test_queries() {
    let space = space();
    let h = Holder::persistent("h");
    let a = item(&space, "a", "A");
    let b = item(&space, "b", "B");
    space.remember(&h, &[a.clone(), b.clone()]).unwrap();
    space.imprint_all([a.clone(), b.clone()]).unwrap();

    assert_eq!(space.count(Some("Item")).unwrap(), 2);
    assert_eq!(space.count(Some("Feed")).unwrap(), 0);
    let found = space.find("Item", "title", &Value::from("B")).unwrap().unwrap();
    assert_eq!(found, b);
    assert_eq!(
        space.contains_keys(&[a.key(), IdKey::from("Item{id=\"zz\"}")]).unwrap(),
        vec![true, false]
    );
    assert!(space.get_key(&a.key()).unwrap().is_some());
}

#[test]
fn test_actions_scenario() {
    let space = space();
    let fav = thing(&space, "Fav", "fav1").build();

    space.add_action(&fav, RemotePriority::Soon).unwrap();
    let actions = space.actions().unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].0, fav);
    assert_eq!(actions[0].1, RemotePriority::Soon);

    space.add_action(&fav, RemotePriority::Immediately).unwrap();
    assert_eq!(space.actions().unwrap()[0].1, RemotePriority::Immediately);

    space.clear_actions(&[fav]).unwrap();
    assert!(space.actions().unwrap().is_empty());
}

#[test]
fn test_diff_session_scenario() {
    let space = space();
    let h1 = Holder::persistent("h1");
    let x = thing(&space, "Item", "x").build();
    space.remember(&h1, &[x.clone()]).unwrap();
    space.imprint(&item(&space, "x", "A")).unwrap();

    space.start_diff().unwrap();
    space.imprint(&item(&space, "x", "B")).unwrap();
    let diff = space.end_diff().unwrap();

    assert_eq!(text(&space, &x, "title").as_deref(), Some("B"));
    assert_eq!(diff.len(), 1);
    let (previous, latest) = diff.changed().next().unwrap();
    assert_eq!(previous.get("title"), Some(&Value::from("A")));
    assert_eq!(latest.get("title"), Some(&Value::from("B")));
    assert!(space.end_diff().unwrap().is_empty());
}

#[test]
fn test_diff_session_accumulates() {
    let space = space();
    let h = Holder::persistent("h");
    let x = thing(&space, "Item", "x").build();
    space.remember(&h, &[x.clone()]).unwrap();

    space.start_diff().unwrap();
    space.imprint(&item(&space, "x", "A")).unwrap();
    space.imprint(&item(&space, "x", "B")).unwrap();
    space.add_invalid(&x).unwrap();
    let diff = space.end_diff().unwrap();

    let change = diff.get(&x.key()).unwrap();
    assert!(change.is_added());
    assert_eq!(change.latest().get("title"), Some(&Value::from("B")));
    assert_eq!(diff.invalidated().count(), 1);
}

#[test]
fn test_invalid_set() {
    let space = space();
    let x = thing(&space, "Item", "x").build();
    let y = thing(&space, "Item", "y").build();

    space.add_invalid(&x).unwrap();
    space.add_invalid(&y).unwrap();
    assert_eq!(space.invalid().unwrap().len(), 2);

    space.clear_invalid(&[x]).unwrap();
    assert_eq!(space.invalid().unwrap(), vec![y]);
}

#[test]
fn test_forget_session() {
    let space = space();
    let session = Holder::session("feed");
    let saved = Holder::persistent("saves");
    let a = item(&space, "a", "A");
    let b = item(&space, "b", "B");
    space.remember(&session, &[a.clone()]).unwrap();
    space.remember(&saved, &[b.clone()]).unwrap();
    space.imprint_all([a.clone(), b.clone()]).unwrap();

    space.forget_session().unwrap();

    assert!(space.get(&a).unwrap().is_none());
    assert!(space.get(&b).unwrap().is_some());
}

#[test]
fn test_clear() {
    let space = space();
    let h = Holder::persistent("h");
    let a = item(&space, "a", "A");
    space.remember(&h, &[a.clone()]).unwrap();
    space.imprint(&a).unwrap();
    space.add_invalid(&a).unwrap();

    space.clear().unwrap();

    assert_eq!(space.count(None).unwrap(), 0);
    assert!(space.invalid().unwrap().is_empty());
    assert!(space.holder_pairs().unwrap().is_empty());
}

#[test]
fn test_concurrent_transactions_serialize() {
    let space = Arc::new(space());
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let space = Arc::clone(&space);
            thread::spawn(move || {
                let h = Holder::persistent(format!("h{t}"));
                for i in 0..25 {
                    let x = item(&space, &format!("{t}-{i}"), "T");
                    space.remember(&h, &[x.clone()]).unwrap();
                    space.imprint(&x).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(space.count(Some("Item")).unwrap(), 100);
}
