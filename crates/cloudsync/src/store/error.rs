use thiserror::Error;

use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to decode {kind} '{id}': {reason}")]
    Decode {
        kind: &'static str,
        id: String,
        reason: String,
    },

    #[error("Store task failed: {0}")]
    Task(String),

    #[error("{kind} '{id}' not found")]
    NotFound { kind: String, id: String },

    #[error("{kind} '{id}' cannot be deleted: {reason}")]
    DeleteBlocked {
        kind: &'static str,
        id: String,
        reason: String,
    },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
