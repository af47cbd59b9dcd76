//! Set comparison between local records and remote resources.
//!
//! Pairing is by identity only: a local record's external id against a remote
//! resource's global id. The result is a [`Partition`] in three parts:
//! records that vanished remotely, pairs present on both sides, and remote
//! resources with no local record yet.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::cloud::CloudResource;
use crate::model::ExternalizedResource;

/// Identity of a remote resource.
pub trait GlobalIdentity {
    fn global_id(&self) -> String;
}

impl<T: CloudResource + ?Sized> GlobalIdentity for Arc<T> {
    fn global_id(&self) -> String {
        CloudResource::global_id(self.as_ref())
    }
}

/// Which side of a comparison an offending item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Local,
    Remote,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Local => f.write_str("local"),
            Side::Remote => f.write_str("remote"),
        }
    }
}

/// Errors that make a comparison meaningless. Both abort the enclosing
/// subtree rather than guess at a pairing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompareError {
    /// Two remote resources reported the same global id.
    #[error("duplicate remote global id '{0}'")]
    DuplicateGlobalId(String),

    /// An item had an empty identity.
    #[error("{side} item at position {index} has an empty identity")]
    MissingIdentity { side: Side, index: usize },
}

/// The three-way split of a comparison.
#[derive(Debug)]
pub struct Partition<L, R> {
    /// Local records with no remote counterpart, in local order.
    pub removed: Vec<L>,
    /// Matched pairs, in local order.
    pub common: Vec<(L, R)>,
    /// Remote resources with no local record, in remote order.
    pub added: Vec<R>,
}

impl<L, R> Default for Partition<L, R> {
    fn default() -> Self {
        Self {
            removed: Vec::new(),
            common: Vec::new(),
            added: Vec::new(),
        }
    }
}

/// Partitions `local` and `remote` by identity.
///
/// Every input lands in exactly one output list. When several local records
/// carry the same external id, the first one is paired and the rest are
/// treated as removed, so the duplicates get cleaned up.
pub fn compare_sets<L, R>(local: Vec<L>, remote: Vec<R>) -> Result<Partition<L, R>, CompareError>
where
    L: ExternalizedResource,
    R: GlobalIdentity,
{
    let mut index: HashMap<String, usize> = HashMap::with_capacity(remote.len());
    for (i, item) in remote.iter().enumerate() {
        let id = item.global_id();
        if id.is_empty() {
            return Err(CompareError::MissingIdentity {
                side: Side::Remote,
                index: i,
            });
        }
        if index.insert(id.clone(), i).is_some() {
            return Err(CompareError::DuplicateGlobalId(id));
        }
    }

    let mut partition = Partition::default();
    let mut slots: Vec<Option<R>> = remote.into_iter().map(Some).collect();

    for (i, item) in local.into_iter().enumerate() {
        if item.external_id().is_empty() {
            return Err(CompareError::MissingIdentity {
                side: Side::Local,
                index: i,
            });
        }
        let slot = index.get(item.external_id()).copied();
        match slot.and_then(|j| slots[j].take()) {
            Some(matched) => partition.common.push((item, matched)),
            None => partition.removed.push(item),
        }
    }

    partition.added = slots.into_iter().flatten().collect();
    Ok(partition)
}
