use std::time::Duration;
use thiserror::Error;

use crate::game::entities::GameId;

/// Failures talking to the snapshot store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    /// Someone else wrote this game since we last read it.
    #[error("game {id} is at version {actual:?}, expected {expected:?}")]
    VersionConflict {
        id: GameId,
        expected: Option<u64>,
        actual: Option<u64>,
    },
}

impl StoreError {
    /// Whether retrying later might succeed.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        !matches!(self, Self::VersionConflict { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
