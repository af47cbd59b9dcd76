use thiserror::Error;

use crate::cloud::CloudError;
use crate::compare::CompareError;
use crate::store::StoreError;

/// Per-item reconciliation failures.
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Cloud error: {0}")]
    Cloud(#[from] CloudError),

    #[error("Compare error: {0}")]
    Compare(#[from] CompareError),

    #[error("{kind} '{id}' disappeared while being synced")]
    Vanished { kind: &'static str, id: String },

    /// A remote reference points at something not synced locally.
    #[error("{kind} '{reference}' referenced by remote resource is unknown locally")]
    Unresolved {
        kind: &'static str,
        reference: String,
    },

    #[error("Could not pick a free name for {kind} '{hint}'")]
    NameExhausted { kind: &'static str, hint: String },
}
