//! Listing and showing stored data

use crate::render;
use crate::store;
use anyhow::{bail, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use thingspace_core::{HolderPair, IdKey, RemotePriority, ThingRecord};

#[derive(Debug, Serialize)]
pub struct ThingEntry<'a> {
    pub key: &'a IdKey,
    #[serde(flatten)]
    pub record: &'a ThingRecord,
}

#[derive(Debug, Serialize)]
pub struct ShowResponse<'a> {
    pub key: &'a IdKey,
    pub record: &'a ThingRecord,
    pub holders: Vec<&'a HolderPair>,
    pub invalid: bool,
}

#[derive(Debug, Serialize)]
pub struct ActionEntry<'a> {
    pub key: &'a IdKey,
    pub priority: RemotePriority,
    pub action: &'a ThingRecord,
}

pub fn list_things(path: &Path, type_name: Option<&str>, json: bool) -> Result<()> {
    let state = store::load_state(path)?;
    let entries: Vec<ThingEntry> = state
        .things
        .iter()
        .filter(|(_, record)| type_name.map_or(true, |t| record.type_name == t))
        .map(|(key, record)| ThingEntry { key, record })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    for entry in &entries {
        println!("{}", entry.key);
    }
    Ok(())
}

pub fn show_thing(path: &Path, key: &str, json: bool) -> Result<()> {
    let state = store::load_state(path)?;
    let key = IdKey::from(key);
    let Some((key, record)) = state.things.get_key_value(&key) else {
        bail!("No thing {} in {}", key, path.display());
    };
    let response = ShowResponse {
        key,
        record,
        holders: state.holders.iter().filter(|pair| &pair.key == key).collect(),
        invalid: state.invalid.contains_key(key),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    println!("{} ({})", response.key, record.type_name);
    for (name, value) in &record.fields {
        println!("  {} = {}", name, render::value(value));
    }
    if !response.holders.is_empty() {
        let names: Vec<String> = response
            .holders
            .iter()
            .map(|pair| pair.holder.to_string())
            .collect();
        println!("Held by: {}", names.join(", "));
    }
    if response.invalid {
        println!("Flagged invalid");
    }
    Ok(())
}

pub fn list_holders(path: &Path, name: Option<&str>, json: bool) -> Result<()> {
    let state = store::load_state(path)?;
    let pairs: Vec<&HolderPair> = state
        .holders
        .iter()
        .filter(|pair| name.map_or(true, |n| pair.holder.name() == n))
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&pairs)?);
        return Ok(());
    }

    let mut grouped: BTreeMap<String, Vec<&IdKey>> = BTreeMap::new();
    for pair in &pairs {
        grouped
            .entry(pair.holder.to_string())
            .or_default()
            .push(&pair.key);
    }
    for (holder, keys) in grouped {
        println!("{} ({})", holder, keys.len());
        for key in keys {
            println!("  {}", key);
        }
    }
    Ok(())
}

pub fn list_actions(path: &Path, json: bool) -> Result<()> {
    let state = store::load_state(path)?;
    let mut entries: Vec<ActionEntry> = state
        .actions
        .iter()
        .map(|(key, stored)| ActionEntry {
            key,
            priority: stored.priority,
            action: &stored.action,
        })
        .collect();
    entries.sort_by(|a, b| (a.priority, a.key).cmp(&(b.priority, b.key)));

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    for entry in &entries {
        println!(
            "{:<12} {}",
            format!("{:?}", entry.priority).to_lowercase(),
            render::record(entry.action)
        );
    }
    Ok(())
}

pub fn list_invalid(path: &Path, json: bool) -> Result<()> {
    let state = store::load_state(path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&state.invalid)?);
        return Ok(());
    }
    for (key, record) in &state.invalid {
        println!("{}  {}", key, render::record(record));
    }
    Ok(())
}
