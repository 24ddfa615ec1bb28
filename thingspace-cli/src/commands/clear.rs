//! Delete a store

use anyhow::{bail, Context, Result};
use std::path::Path;
use thingspace_core::Storage;
use thingspace_store::JsonFileStorage;
use tracing::info;

pub fn clear_store(path: &Path, yes: bool) -> Result<()> {
    if !yes {
        bail!(
            "Refusing to clear {} without --yes",
            path.display()
        );
    }
    JsonFileStorage::new(path)
        .clear()
        .with_context(|| format!("Failed to clear {}", path.display()))?;
    info!(path = %path.display(), "Cleared store");
    println!("Cleared {}", path.display());
    Ok(())
}
