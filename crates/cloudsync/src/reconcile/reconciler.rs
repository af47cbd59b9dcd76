use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::{naming, ReconcileError, SyncContext, SyncKind, NAME_LOCK};
use crate::cloud::CloudResource;
use crate::compare::compare_sets;
use crate::model::{Record, STATUS_UNKNOWN};
use crate::result::SyncResult;
use crate::store::StoreError;
use crate::telemetry::AUDIT_TARGET;

/// A local record together with the remote resource it mirrors.
pub struct SyncPair<K: SyncKind> {
    pub local: K::Local,
    pub remote: Arc<K::Remote>,
    /// Created during this pass.
    pub is_new: bool,
}

pub struct Reconciled<K: SyncKind> {
    pub result: SyncResult,
    /// Pairs to descend into: unchanged, updated and created records.
    /// Items whose update or create failed are left out.
    pub pairs: Vec<SyncPair<K>>,
}

enum Removal {
    Deleted,
    Blocked,
    Gone,
}

pub struct Reconciler<K> {
    kind: K,
}

impl<K: SyncKind> Reconciler<K> {
    pub fn new(kind: K) -> Self {
        Self { kind }
    }

    /// Brings the local children of `parent` in line with `remote`.
    ///
    /// Item failures are counted and skipped. If the local set cannot be
    /// listed or the two sets cannot be compared, nothing is touched and
    /// the result carries the error.
    pub async fn sync(
        &self,
        ctx: &SyncContext,
        parent: &K::Parent,
        remote: Vec<Arc<K::Remote>>,
    ) -> Reconciled<K> {
        let kind = K::Local::KIND;
        let mut result = SyncResult::default();
        let mut pairs = Vec::new();

        let _set_guard = match self.kind.set_lock(parent, ctx) {
            Some(key) => Some(ctx.locks.acquire(key).await),
            None => None,
        };

        let locals = match ctx
            .store
            .query::<K::Local>(&self.kind.scope(parent, ctx))
            .await
        {
            Ok(locals) => locals,
            Err(e) => {
                error!(kind, error = %e, "failed to list local records");
                result.error(e);
                return Reconciled { result, pairs };
            }
        };

        let partition = match compare_sets(locals, remote) {
            Ok(partition) => partition,
            Err(e) => {
                error!(kind, error = %e, "compare failed");
                result.error(e);
                return Reconciled { result, pairs };
            }
        };

        for local in &partition.removed {
            match self.remove(ctx, local).await {
                Ok(Removal::Deleted) => result.delete(),
                Ok(Removal::Blocked) | Ok(Removal::Gone) => {}
                Err(e) => result.delete_error(format_args!("{} {}: {}", kind, local.id(), e)),
            }
        }

        for (local, remote) in partition.common {
            if ctx.range.xor {
                pairs.push(SyncPair {
                    local,
                    remote,
                    is_new: false,
                });
                continue;
            }
            match self.update(ctx, parent, &local, remote.as_ref()).await {
                Ok((updated, changed)) => {
                    if changed {
                        result.update();
                    }
                    pairs.push(SyncPair {
                        local: updated,
                        remote,
                        is_new: false,
                    });
                }
                Err(e) => result.update_error(format_args!("{} {}: {}", kind, local.id(), e)),
            }
        }

        for remote in partition.added {
            match self.create(ctx, parent, remote.as_ref()).await {
                Ok(local) => {
                    result.add();
                    pairs.push(SyncPair {
                        local,
                        remote,
                        is_new: true,
                    });
                }
                Err(e) => result.add_error(format_args!(
                    "{} from remote '{}': {}",
                    kind,
                    remote.global_id(),
                    e
                )),
            }
        }

        Reconciled { result, pairs }
    }

    async fn remove(&self, ctx: &SyncContext, local: &K::Local) -> Result<Removal, ReconcileError> {
        let kind = K::Local::KIND;
        let _guard = ctx.locks.lock_object(kind, local.id()).await;

        let Some(current) = ctx.store.get::<K::Local>(local.id()).await? else {
            debug!(kind, id = local.id(), "already deleted");
            return Ok(Removal::Gone);
        };

        match ctx
            .store
            .validate_delete_condition(&current, K::DELETE_GUARDS)
            .await
        {
            Ok(()) => {}
            Err(StoreError::DeleteBlocked { reason, .. }) => {
                warn!(
                    kind,
                    id = current.id(),
                    %reason,
                    "remote resource is gone but the record cannot be deleted, marking unknown"
                );
                if current.base().status != STATUS_UNKNOWN {
                    ctx.store
                        .update_with(&current, |r: &mut K::Local| {
                            r.base_mut().status = STATUS_UNKNOWN.to_string();
                            Ok::<(), ReconcileError>(())
                        })
                        .await?;
                }
                self.kind.delete_blocked(&current, ctx).await?;
                return Ok(Removal::Blocked);
            }
            Err(e) => return Err(e.into()),
        }

        let nested = self.kind.purge_nested(&current, ctx).await?;
        if nested > 0 {
            debug!(kind, id = current.id(), purged = nested, "purged nested records");
        }
        for child in K::OWNED_CHILDREN {
            let purged = ctx.store.delete_referencing(*child, current.id()).await?;
            if purged > 0 {
                debug!(kind, id = current.id(), child = child.kind, purged, "purged children");
            }
        }
        ctx.store.delete(&current).await?;

        info!(
            target: AUDIT_TARGET,
            kind,
            id = current.id(),
            name = current.name(),
            provider = %ctx.provider.id,
            "deleted record"
        );
        Ok(Removal::Deleted)
    }

    async fn update(
        &self,
        ctx: &SyncContext,
        parent: &K::Parent,
        local: &K::Local,
        remote: &K::Remote,
    ) -> Result<(K::Local, bool), ReconcileError> {
        let kind = K::Local::KIND;
        let refs = self.kind.resolve(remote, parent, ctx).await?;

        let _guard = ctx.locks.lock_object(kind, local.id()).await;
        let current = ctx
            .store
            .get::<K::Local>(local.id())
            .await?
            .ok_or_else(|| ReconcileError::Vanished {
                kind,
                id: local.id().to_string(),
            })?;

        let wanted = naming::sanitize(&remote.name(), kind);
        let renaming = current.name() != wanted;
        let _name_guard = if renaming {
            Some(ctx.locks.lock_raw(kind, NAME_LOCK).await)
        } else {
            None
        };
        let new_name = if renaming {
            Some(naming::generate_name(&ctx.store, kind, &wanted, Some(current.id())).await?)
        } else {
            None
        };

        let (updated, diff) = ctx
            .store
            .update_with(&current, |draft: &mut K::Local| {
                if let Some(name) = new_name {
                    draft.base_mut().name = name;
                }
                ctx.apply_metadata(draft.base_mut(), remote);
                self.kind.update(draft, remote, parent, &refs);
                Ok::<(), ReconcileError>(())
            })
            .await?;

        let changed = !diff.is_empty();
        if changed {
            info!(
                target: AUDIT_TARGET,
                kind,
                id = updated.id(),
                fields = ?diff.fields(),
                provider = %ctx.provider.id,
                "updated record"
            );
        }
        Ok((updated, changed))
    }

    async fn create(
        &self,
        ctx: &SyncContext,
        parent: &K::Parent,
        remote: &K::Remote,
    ) -> Result<K::Local, ReconcileError> {
        let kind = K::Local::KIND;
        let refs = self.kind.resolve(remote, parent, ctx).await?;
        let mut record = self.kind.create(remote, parent, &refs, ctx);

        let _name_guard = ctx.locks.lock_raw(kind, NAME_LOCK).await;
        let name = naming::generate_name(&ctx.store, kind, &remote.name(), None).await?;
        record.base_mut().name = name;
        ctx.store.insert(&record).await?;

        info!(
            target: AUDIT_TARGET,
            kind,
            id = record.id(),
            name = record.name(),
            external_id = %record.base().external_id,
            provider = %ctx.provider.id,
            "created record"
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::{CloudStorage, CloudWire, InventoryNode};
    use crate::db::Database;
    use crate::lock::KeyedLockManager;
    use crate::model::{Host, Network, ResourceBase, Vpc, Wire};
    use crate::reconcile::kinds::{HoststorageKind, WireKind, WireParent};
    use crate::reconcile::ProviderInfo;
    use crate::store::{RecordStore, Scope, SqliteStore};
    use crate::sync::SyncRange;

    fn context() -> SyncContext {
        let store = RecordStore::new(Arc::new(SqliteStore::new(Database::open_in_memory().unwrap())));
        SyncContext::new(
            store,
            Arc::new(KeyedLockManager::new()),
            Arc::new(ProviderInfo::new("p1", "acme")),
        )
    }

    async fn insert_vpc(ctx: &SyncContext) -> Vpc {
        let mut vpc = Vpc {
            base: ResourceBase::new("v"),
            ..Default::default()
        };
        vpc.base.external_id = "vpc-1".to_string();
        vpc.base.manager_id = "p1".to_string();
        ctx.store.insert(&vpc).await.unwrap();
        vpc
    }

    async fn insert_wire(ctx: &SyncContext, vpc: &Vpc, name: &str, external_id: &str) -> Wire {
        let mut wire = Wire {
            base: ResourceBase::new(name),
            vpc_id: vpc.base.id.clone(),
            ..Default::default()
        };
        wire.base.external_id = external_id.to_string();
        wire.base.manager_id = "p1".to_string();
        ctx.store.insert(&wire).await.unwrap();
        wire
    }

    fn remote_wire(id: &str, name: &str) -> Arc<dyn CloudWire> {
        let mut node = InventoryNode::new(id).with_attr("bandwidth", 1000);
        node.name = name.to_string();
        Arc::new(node)
    }

    fn parent(vpc: &Vpc) -> WireParent {
        WireParent {
            vpc: vpc.clone(),
            zone: None,
        }
    }

    async fn wires_of(ctx: &SyncContext, vpc: &Vpc) -> Vec<Wire> {
        ctx.store
            .query(&Scope::all().with("vpc_id", vpc.base.id.as_str()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_update_delete_and_add() {
        let ctx = context();
        let vpc = insert_vpc(&ctx).await;
        let w1 = insert_wire(&ctx, &vpc, "w1", "e1").await;
        insert_wire(&ctx, &vpc, "w2", "e2").await;

        let reconciler = Reconciler::new(WireKind);
        let remote = vec![remote_wire("e1", "w1-new"), remote_wire("e3", "w3")];
        let out = reconciler.sync(&ctx, &parent(&vpc), remote).await;

        assert_eq!(out.result.del_cnt, 1);
        assert_eq!(out.result.update_cnt, 1);
        assert_eq!(out.result.add_cnt, 1);
        assert!(!out.result.has_item_errors());

        let wires = wires_of(&ctx, &vpc).await;
        assert_eq!(wires.len(), 2);
        let updated = wires.iter().find(|w| w.base.id == w1.base.id).unwrap();
        assert_eq!(updated.base.name, "w1-new");
        assert_eq!(updated.bandwidth, 1000);
        let added = wires.iter().find(|w| w.base.external_id == "e3").unwrap();
        assert_eq!(added.vpc_id, vpc.base.id);
        assert_eq!(added.base.manager_id, "p1");

        assert_eq!(out.pairs.len(), 2);
        assert!(out.pairs.iter().any(|p| p.is_new && p.local.base.external_id == "e3"));
    }

    #[tokio::test]
    async fn test_second_pass_is_idempotent() {
        let ctx = context();
        let vpc = insert_vpc(&ctx).await;
        let reconciler = Reconciler::new(WireKind);
        let remote = || vec![remote_wire("e1", "a"), remote_wire("e2", "b")];

        let first = reconciler.sync(&ctx, &parent(&vpc), remote()).await;
        assert_eq!(first.result.add_cnt, 2);

        let second = reconciler.sync(&ctx, &parent(&vpc), remote()).await;
        assert_eq!(second.result, SyncResult::default());
        assert_eq!(second.pairs.len(), 2);
    }

    #[tokio::test]
    async fn test_referenced_record_is_marked_not_deleted() {
        let ctx = context();
        let vpc = insert_vpc(&ctx).await;
        let wire = insert_wire(&ctx, &vpc, "w1", "e1").await;
        let network = Network {
            base: ResourceBase::new("n1"),
            wire_id: wire.base.id.clone(),
            ..Default::default()
        };
        ctx.store.insert(&network).await.unwrap();

        let out = Reconciler::new(WireKind)
            .sync(&ctx, &parent(&vpc), Vec::new())
            .await;

        assert_eq!(out.result.del_cnt, 0);
        assert_eq!(out.result.del_err_cnt, 0);
        let kept: Wire = ctx.store.get(&wire.base.id).await.unwrap().unwrap();
        assert_eq!(kept.base.status, STATUS_UNKNOWN);
        let network: Network = ctx.store.get(&network.base.id).await.unwrap().unwrap();
        assert_eq!(network.base.status, STATUS_UNKNOWN);
    }

    #[tokio::test]
    async fn test_name_collision_gets_suffix() {
        let ctx = context();
        let vpc = insert_vpc(&ctx).await;
        // Locally created, never compared.
        insert_wire(&ctx, &vpc, "edge", "").await;

        let out = Reconciler::new(WireKind)
            .sync(&ctx, &parent(&vpc), vec![remote_wire("e1", "edge")])
            .await;

        assert_eq!(out.result.add_cnt, 1);
        assert_eq!(out.pairs[0].local.base.name, "edge-1");
    }

    #[tokio::test]
    async fn test_xor_range_skips_updates() {
        let ctx = context().with_range(SyncRange {
            xor: true,
            ..Default::default()
        });
        let vpc = insert_vpc(&ctx).await;
        let wire = insert_wire(&ctx, &vpc, "w1", "e1").await;

        let out = Reconciler::new(WireKind)
            .sync(&ctx, &parent(&vpc), vec![remote_wire("e1", "renamed")])
            .await;

        assert_eq!(out.result.update_cnt, 0);
        assert_eq!(out.pairs.len(), 1);
        let stored: Wire = ctx.store.get(&wire.base.id).await.unwrap().unwrap();
        assert_eq!(stored.base.name, "w1");
    }

    #[tokio::test]
    async fn test_duplicate_remote_ids_abort_pass() {
        let ctx = context();
        let vpc = insert_vpc(&ctx).await;
        insert_wire(&ctx, &vpc, "w1", "e1").await;

        let out = Reconciler::new(WireKind)
            .sync(
                &ctx,
                &parent(&vpc),
                vec![remote_wire("e9", "a"), remote_wire("e9", "b")],
            )
            .await;

        assert!(out.result.is_error());
        assert_eq!(out.result.del_cnt, 0);
        assert!(out.pairs.is_empty());
        assert_eq!(wires_of(&ctx, &vpc).await.len(), 1);
    }

    #[tokio::test]
    async fn test_unresolved_reference_counts_add_error() {
        let ctx = context();
        let mut host = Host {
            base: ResourceBase::new("h1"),
            ..Default::default()
        };
        host.base.manager_id = "p1".to_string();
        ctx.store.insert(&host).await.unwrap();

        let unknown: Arc<dyn CloudStorage> = Arc::new(InventoryNode::new("st-unknown"));
        let out = Reconciler::new(HoststorageKind)
            .sync(&ctx, &host, vec![unknown])
            .await;

        assert_eq!(out.result.add_cnt, 0);
        assert_eq!(out.result.add_err_cnt, 1);
        assert!(!out.result.is_error());
        assert!(out.pairs.is_empty());
    }
}
