//! Generic per-kind reconciliation.
//!
//! A [`SyncKind`] describes how one resource kind maps between its remote
//! trait and its local record: which records belong to a parent, what must
//! not reference a record before it is deleted, and how fields are copied.
//! [`Reconciler`] runs the shared algorithm (list, compare, delete, update,
//! create) for any kind.

use async_trait::async_trait;

pub mod context;
pub mod error;
pub mod kinds;
pub mod naming;
pub mod reconciler;
pub mod storagecache;

pub use context::{ProviderInfo, SyncContext};
pub use error::ReconcileError;
pub use reconciler::{Reconciled, Reconciler, SyncPair};
pub use storagecache::{StoragecachePair, StoragecachePairs};

use crate::cloud::CloudResource;
use crate::lock::LockKey;
use crate::model::Record;
use crate::store::{ChildRef, Scope};

/// Raw lock key, per kind, guarding name allocation.
pub const NAME_LOCK: &str = "name";

#[async_trait]
pub trait SyncKind: Send + Sync + 'static {
    type Local: Record;
    type Remote: CloudResource + ?Sized;
    type Parent: Send + Sync;
    /// Local ids looked up from remote references before create/update.
    type Refs: Default + Send + Sync;

    /// Child kinds whose records block deletion while they reference one.
    const DELETE_GUARDS: &'static [ChildRef] = &[];

    /// Child kinds deleted together with a record.
    const OWNED_CHILDREN: &'static [ChildRef] = &[];

    /// Local records compared against the remote children of `parent`.
    fn scope(&self, parent: &Self::Parent, ctx: &SyncContext) -> Scope;

    /// Lock held for the whole pass under `parent`. Must not be a lock the
    /// cascade already holds while descending into `parent`.
    fn set_lock(&self, _parent: &Self::Parent, _ctx: &SyncContext) -> Option<LockKey> {
        None
    }

    /// Deletes records further down than `OWNED_CHILDREN` reaches. Runs
    /// before the owned children and the record itself are deleted.
    async fn purge_nested(
        &self,
        _record: &Self::Local,
        _ctx: &SyncContext,
    ) -> Result<u64, ReconcileError> {
        Ok(0)
    }

    /// Runs when a remotely removed record has to stay because something
    /// still references it.
    async fn delete_blocked(
        &self,
        _record: &Self::Local,
        _ctx: &SyncContext,
    ) -> Result<u64, ReconcileError> {
        Ok(0)
    }

    async fn resolve(
        &self,
        _remote: &Self::Remote,
        _parent: &Self::Parent,
        _ctx: &SyncContext,
    ) -> Result<Self::Refs, ReconcileError> {
        Ok(Self::Refs::default())
    }

    /// Builds the local record for a new remote resource. The reconciler
    /// assigns the final name.
    fn create(
        &self,
        remote: &Self::Remote,
        parent: &Self::Parent,
        refs: &Self::Refs,
        ctx: &SyncContext,
    ) -> Self::Local;

    /// Copies kind fields from `remote`. Status, tags, ownership and name
    /// are handled by the reconciler.
    fn update(
        &self,
        local: &mut Self::Local,
        remote: &Self::Remote,
        parent: &Self::Parent,
        refs: &Self::Refs,
    );
}
