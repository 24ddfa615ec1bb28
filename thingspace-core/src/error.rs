//! Error types for space operations

use crate::storage::StorageError;
use thiserror::Error;

/// Error returned by every [`Space`](crate::space::Space) operation
#[derive(Debug, Error)]
pub enum SpaceError {
    /// Malformed input, e.g. a value thing where an identity is required
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Warm-up restore failed; the space cannot be used further
    #[error(transparent)]
    Restore(#[from] RestoreError),

    #[error(transparent)]
    Derivation(#[from] DerivationError),

    #[error(transparent)]
    ReactiveLoop(#[from] ReactiveLoopError),

    /// An earlier warm-up restore failed
    #[error("Space is unusable after a failed restore")]
    Poisoned,

    #[error("Space has been released")]
    Released,

    #[error("Failed to start write-behind worker: {0}")]
    Worker(#[source] std::io::Error),
}

impl SpaceError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        SpaceError::InvalidArgument(message.into())
    }
}

/// Failure of the one-time bulk restore
#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("Failed to restore space: {0}")]
    Storage(#[from] StorageError),

    #[error("Restored entity {key} was rejected: {reason}")]
    Rejected { key: String, reason: String },
}

/// Failure of the derivation collaborator for one entity field
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Failed to derive {field} of {key}: {message}")]
pub struct DerivationError {
    pub key: String,
    pub field: String,
    pub message: String,
}

impl DerivationError {
    pub fn new(key: impl Into<String>, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Rederivation kept producing changes past the configured round limit
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error(
    "Reactive rederivation did not converge after {rounds} rounds; still pending: {}",
    .pending.join(", ")
)]
pub struct ReactiveLoopError {
    pub rounds: usize,
    /// `key.field` requests of the last round
    pub pending: Vec<String>,
}

/// Result type using SpaceError
pub type Result<T> = std::result::Result<T, SpaceError>;
