//! [`SyncKind`](super::SyncKind) bindings for every synced resource kind.
//!
//! Each binding is a unit struct. Parents are the local records the
//! cascade already reconciled one level up.

pub mod compute;
pub mod loadbalancer;
pub mod network;

pub use compute::{
    CachedimageKind, DiskKind, GuestKind, GuestdiskKind, GuestnetworkKind, HostKind,
    HoststorageKind, NetinterfaceKind, ServerSkuKind, SnapshotKind, StorageKind,
};
pub use loadbalancer::{
    LbAclKind, LbBackendGroupKind, LbBackendKind, LbCertificateKind, LbListenerKind,
    LbListenerRuleKind, LoadbalancerKind,
};
pub use network::{
    CloudregionKind, ElasticipKind, NetworkKind, RouteTableKind, SecgroupKind, VpcKind,
    WireKind, WireParent, ZoneKind,
};

use tracing::debug;

use super::{ReconcileError, SyncContext};
use crate::model::{Record, STATUS_UNKNOWN};
use crate::store::Scope;

/// Synced records of this provider in region `region_id`.
fn region_scope(ctx: &SyncContext, region_id: &str) -> Scope {
    Scope::managed_by(ctx.provider.id.as_str()).with("cloudregion_id", region_id)
}

/// Synced records of this provider whose `field` is `parent_id`.
fn child_scope(ctx: &SyncContext, field: &'static str, parent_id: &str) -> Scope {
    Scope::managed_by(ctx.provider.id.as_str()).with(field, parent_id)
}

/// Local id of the record mirroring `reference`, failing if there is none.
async fn resolve_required<R: Record>(
    ctx: &SyncContext,
    reference: Option<String>,
) -> Result<String, ReconcileError> {
    let reference = reference.unwrap_or_default();
    match ctx.find_external::<R>(&reference).await? {
        Some(record) => Ok(record.id().to_string()),
        None => Err(ReconcileError::Unresolved {
            kind: R::KIND,
            reference,
        }),
    }
}

/// Local id of the record mirroring `reference`, or empty.
async fn resolve_optional<R: Record>(
    ctx: &SyncContext,
    reference: Option<String>,
) -> Result<String, ReconcileError> {
    let Some(reference) = reference.filter(|r| !r.is_empty()) else {
        return Ok(String::new());
    };
    match ctx.find_external::<R>(&reference).await? {
        Some(record) => Ok(record.id().to_string()),
        None => {
            debug!(kind = R::KIND, %reference, "reference not synced locally, leaving it empty");
            Ok(String::new())
        }
    }
}

/// Marks every `R` whose `field` is `parent_id` unknown and returns how
/// many changed.
async fn mark_unknown<R: Record>(
    ctx: &SyncContext,
    field: &'static str,
    parent_id: &str,
) -> Result<u64, ReconcileError> {
    let mut marked = 0;
    for record in ctx.store.query::<R>(&Scope::all().with(field, parent_id)).await? {
        if record.base().status == STATUS_UNKNOWN {
            continue;
        }
        let _guard = ctx.locks.lock_object(R::KIND, record.id()).await;
        ctx.store
            .update_with(&record, |r: &mut R| {
                r.base_mut().status = STATUS_UNKNOWN.to_string();
                Ok::<(), ReconcileError>(())
            })
            .await?;
        marked += 1;
    }
    if marked > 0 {
        debug!(kind = R::KIND, parent = parent_id, marked, "marked children unknown");
    }
    Ok(marked)
}
