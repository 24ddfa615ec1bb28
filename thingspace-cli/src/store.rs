//! Locating and loading the snapshot file

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use thingspace_core::{SpaceConfig, StoredState};
use thingspace_store::{load_snapshot, Snapshot};
use tracing::debug;

/// Snapshot path from `--store`, else from the config file, else the default
pub fn resolve_path(config_path: &Path, store: Option<&Path>) -> Result<PathBuf> {
    if let Some(store) = store {
        return Ok(store.to_path_buf());
    }
    let config = if config_path.exists() {
        SpaceConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        debug!(config = %config_path.display(), "No config file, using defaults");
        SpaceConfig::default()
    };
    Ok(config.storage_path())
}

/// Load the snapshot, failing if the file does not exist
pub fn load(path: &Path) -> Result<Snapshot> {
    load_snapshot(path)
        .with_context(|| format!("Failed to read store {}", path.display()))?
        .with_context(|| format!("No store at {}", path.display()))
}

/// Stored state, empty if the file does not exist
pub fn load_state(path: &Path) -> Result<StoredState> {
    Ok(load_snapshot(path)
        .with_context(|| format!("Failed to read store {}", path.display()))?
        .map(|snapshot| snapshot.state)
        .unwrap_or_default())
}
