use thiserror::Error;

use crate::cloud::CloudError;
use crate::db::DatabaseError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Sync unit '{0}' not found")]
    UnitNotFound(String),

    #[error("Sync unit for provider '{provider_id}' region '{region_id}' is disabled")]
    UnitDisabled {
        provider_id: String,
        region_id: String,
    },

    #[error("Provider '{0}' is not registered")]
    ProviderNotRegistered(String),

    #[error("Region '{0}' not found locally")]
    RegionNotFound(String),

    #[error("Region reconciliation failed: {0}")]
    RegionSync(String),

    #[error("Sync unit task failed: {0}")]
    Task(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Cloud error: {0}")]
    Cloud(#[from] CloudError),
}

pub type Result<T> = std::result::Result<T, SyncError>;
