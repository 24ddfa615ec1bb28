//! Store overview

use crate::store;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use thingspace_core::Lifecycle;

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub path: String,
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub things: usize,
    pub types: BTreeMap<String, usize>,
    pub holders: usize,
    pub persistent_holders: usize,
    pub actions: usize,
    pub invalid: usize,
}

pub fn summary(path: &Path, json: bool) -> Result<()> {
    let snapshot = store::load(path)?;
    let state = &snapshot.state;

    let mut types = BTreeMap::new();
    for record in state.things.values() {
        *types.entry(record.type_name.clone()).or_insert(0) += 1;
    }

    let response = SummaryResponse {
        path: path.display().to_string(),
        version: snapshot.version,
        saved_at: snapshot.saved_at,
        things: state.things.len(),
        types,
        holders: state.holders.len(),
        persistent_holders: state
            .holders
            .iter()
            .filter(|pair| pair.holder.lifecycle() == Lifecycle::Persistent)
            .count(),
        actions: state.actions.len(),
        invalid: state.invalid.len(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    println!("Store: {}", response.path);
    println!("Saved: {}", response.saved_at.to_rfc3339());
    println!("Things: {}", response.things);
    for (type_name, count) in &response.types {
        println!("  {}: {}", type_name, count);
    }
    println!(
        "Holders: {} ({} persistent)",
        response.holders, response.persistent_holders
    );
    println!("Actions: {}", response.actions);
    println!("Invalid: {}", response.invalid);
    Ok(())
}
