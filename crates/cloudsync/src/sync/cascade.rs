//! The cascading walk over one region.
//!
//! Kinds are reconciled top-down in a fixed order. Each step fetches the
//! remote children of one parent and runs a [`Reconciler`] over them; the
//! returned pairs become the parents of the next level. A failed fetch or a
//! failed pass skips that subtree only. Before descending into a record,
//! the walk takes its object lock and re-reads it, so two syncs touching
//! the same parent serialize on it.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::cloud::{
    Capabilities, CloudError, CloudProvider, CloudRegion, CloudResult, CloudVm, CloudVpc,
};
use crate::lock::LockGuard;
use crate::model::{
    Cloudregion, Elasticip, Guest, Host, Loadbalancer, LoadbalancerBackendGroup,
    LoadbalancerListener, Record, Storage, Vpc, Wire, Zone,
};
use crate::reconcile::kinds::{
    CachedimageKind, CloudregionKind, DiskKind, ElasticipKind, GuestKind, GuestdiskKind,
    GuestnetworkKind, HostKind, HoststorageKind, LbAclKind, LbBackendGroupKind, LbBackendKind,
    LbCertificateKind, LbListenerKind, LbListenerRuleKind, LoadbalancerKind, NetinterfaceKind,
    NetworkKind, RouteTableKind, SecgroupKind, ServerSkuKind, SnapshotKind, StorageKind, VpcKind,
    WireKind, WireParent, ZoneKind,
};
use crate::reconcile::storagecache::track_storagecache;
use crate::reconcile::{
    Reconciled, Reconciler, ReconcileError, StoragecachePairs, SyncContext, SyncKind, SyncPair,
};
use crate::result::{SyncResult, SyncResultSet};
use crate::store::Scope;

/// One walk over one region, accumulating results as it goes.
pub struct Cascade<'a> {
    ctx: &'a SyncContext,
    capabilities: Capabilities,
    is_public_cloud: bool,
    results: SyncResultSet,
    caches: StoragecachePairs,
}

impl<'a> Cascade<'a> {
    pub fn new(ctx: &'a SyncContext, provider: &dyn CloudProvider) -> Self {
        Self {
            ctx,
            capabilities: provider.capabilities(),
            is_public_cloud: provider.is_public_cloud(),
            results: SyncResultSet::new(),
            caches: StoragecachePairs::new(),
        }
    }

    pub fn results(&self) -> &SyncResultSet {
        &self.results
    }

    /// Walks a provider-managed region: zones, networking, compute,
    /// snapshots, load balancers and cached images.
    pub async fn sync_public(mut self, region: &Cloudregion, remote: &dyn CloudRegion) -> SyncResultSet {
        let zones = self
            .reconcile(ZoneKind, region, region.name(), remote.zones())
            .await
            .unwrap_or_default();

        if self.capabilities.compute && self.capabilities.sku_from_cloud {
            self.reconcile(ServerSkuKind, region, region.name(), remote.skus())
                .await;
        }

        if self.capabilities.network {
            self.sync_vpcs(region, remote).await;
            self.reconcile(ElasticipKind, region, region.name(), remote.eips())
                .await;
        }

        if self.capabilities.compute {
            for zone in zones {
                if !self.ctx.range.needs_zone(zone.local.id()) {
                    continue;
                }
                let zone_name = zone.local.name().to_string();
                let storages = self
                    .reconcile(StorageKind, &zone.local, &zone_name, zone.remote.storages())
                    .await;
                if let Some(storages) = storages {
                    self.sync_storages(storages).await;
                }
                let hosts = self
                    .reconcile(HostKind, &zone.local, &zone_name, zone.remote.hosts())
                    .await;
                if let Some(hosts) = hosts {
                    self.sync_hosts(hosts).await;
                }
            }

            self.reconcile(SnapshotKind, region, region.name(), remote.snapshots())
                .await;
        }

        if self.capabilities.loadbalancer {
            self.sync_loadbalancers(region, remote).await;
        }

        if self.capabilities.compute {
            self.sync_cached_images().await;
        }

        self.results
    }

    /// Walks a self-managed region. Zones and VPCs are local; wires hang
    /// off the default VPC, and storages and hosts come straight from the
    /// region.
    pub async fn sync_on_premise(
        mut self,
        region: &Cloudregion,
        remote: &dyn CloudRegion,
    ) -> SyncResultSet {
        let zone = match self.ctx.store.list_in_region::<Zone>(region.id()).await {
            Ok(zones) => zones.into_iter().next(),
            Err(e) => {
                error!(region = region.id(), error = %e, "failed to list local zones");
                None
            }
        };
        let Some(zone) = zone else {
            warn!(region = region.id(), "on-premise region has no zone, nothing to attach to");
            return self.results;
        };

        if self.capabilities.network {
            self.sync_default_vpc_wires(region, remote, &zone).await;
        }

        if self.capabilities.compute {
            let storages = self
                .reconcile(StorageKind, &zone, region.name(), remote.storages())
                .await;
            if let Some(storages) = storages {
                self.sync_storages(storages).await;
            }
            let hosts = self
                .reconcile(HostKind, &zone, region.name(), remote.hosts())
                .await;
            if let Some(hosts) = hosts {
                self.sync_hosts(hosts).await;
            }
            self.sync_cached_images().await;
        }

        self.results
    }

    /// Reconciles the children of `parent` fetched by `fetch`. Returns the
    /// pairs to descend into, or `None` if the kind is skipped, the fetch
    /// failed or the pass could not run.
    async fn reconcile<K, F>(
        &mut self,
        kind: K,
        parent: &K::Parent,
        parent_name: &str,
        fetch: F,
    ) -> Option<Vec<SyncPair<K>>>
    where
        K: SyncKind,
        F: Future<Output = CloudResult<Vec<Arc<K::Remote>>>>,
    {
        let keyword = K::Local::KIND;
        if !self.ctx.range.is_not_skip(keyword) {
            debug!(keyword, "skipped by sync range");
            return None;
        }

        let ctx = self.ctx;
        let span = info_span!("subtree", resource = keyword, parent = parent_name);
        let outcome = async move {
            let remote = ctx.fetch(keyword, fetch).await?;
            Ok::<_, CloudError>(Reconciler::new(kind).sync(ctx, parent, remote).await)
        }
        .instrument(span)
        .await;

        let Reconciled { result, pairs } = match outcome {
            Ok(reconciled) => reconciled,
            Err(e) => {
                error!("Fetch {} for {} failed: {}", keyword, parent_name, e);
                return None;
            }
        };

        self.results.add(keyword, &result);
        if result.is_error() {
            error!("Sync {} for {} failed: {}", keyword, parent_name, result);
            return None;
        }
        info!("Sync {} for {} result: {}", keyword, parent_name, result);
        Some(pairs)
    }

    /// Locks `record` and re-reads it. `None` if it vanished meanwhile.
    async fn lock_fresh<R: Record>(&self, record: &R) -> Option<(LockGuard, R)> {
        let guard = self.ctx.locks.lock_object(R::KIND, record.id()).await;
        match self.ctx.store.get::<R>(record.id()).await {
            Ok(Some(fresh)) => Some((guard, fresh)),
            Ok(None) => {
                debug!(kind = R::KIND, id = record.id(), "record vanished, skipping its children");
                None
            }
            Err(e) => {
                error!(kind = R::KIND, id = record.id(), error = %e, "failed to reload record");
                None
            }
        }
    }

    async fn sync_vpcs(&mut self, region: &Cloudregion, remote: &dyn CloudRegion) {
        let Some(vpcs) = self
            .reconcile(VpcKind, region, region.name(), remote.vpcs())
            .await
        else {
            return;
        };

        for pair in vpcs {
            let Some((_guard, vpc)) = self.lock_fresh(&pair.local).await else {
                continue;
            };
            let parent = WireParent { vpc, zone: None };
            self.sync_wires(&parent, pair.remote.as_ref()).await;
            self.reconcile(SecgroupKind, &parent.vpc, parent.vpc.name(), pair.remote.secgroups())
                .await;
            self.reconcile(
                RouteTableKind,
                &parent.vpc,
                parent.vpc.name(),
                pair.remote.route_tables(),
            )
            .await;
        }
    }

    async fn sync_wires(&mut self, parent: &WireParent, remote_vpc: &dyn CloudVpc) {
        let Some(wires) = self
            .reconcile(WireKind, parent, parent.vpc.name(), remote_vpc.wires())
            .await
        else {
            return;
        };

        for pair in wires {
            let Some((_guard, wire)) = self.lock_fresh::<Wire>(&pair.local).await else {
                continue;
            };
            self.reconcile(NetworkKind, &wire, wire.name(), pair.remote.networks())
                .await;
        }
    }

    async fn sync_default_vpc_wires(
        &mut self,
        region: &Cloudregion,
        remote: &dyn CloudRegion,
        zone: &Zone,
    ) {
        let local = match self.ctx.store.list_in_region::<Vpc>(region.id()).await {
            Ok(vpcs) => vpcs.into_iter().find(|v| v.is_default),
            Err(e) => {
                error!(region = region.id(), error = %e, "failed to list local vpcs");
                return;
            }
        };
        let Some(local) = local else {
            debug!(region = region.id(), "no default vpc, skipping wires");
            return;
        };

        let remote_vpc = match self.ctx.fetch("vpcs", remote.vpcs()).await {
            Ok(vpcs) => vpcs.into_iter().find(|v| v.is_default()),
            Err(e) => {
                error!("Fetch vpcs for {} failed: {}", region.name(), e);
                return;
            }
        };
        let Some(remote_vpc) = remote_vpc else {
            warn!(region = region.id(), "remote region reports no default vpc");
            return;
        };

        let Some((_guard, vpc)) = self.lock_fresh(&local).await else {
            return;
        };
        let parent = WireParent {
            vpc,
            zone: Some(zone.clone()),
        };
        self.sync_wires(&parent, remote_vpc.as_ref()).await;
    }

    async fn sync_storages(&mut self, storages: Vec<SyncPair<StorageKind>>) {
        for pair in storages {
            if let Err(e) = track_storagecache(
                self.ctx,
                &pair.local,
                pair.remote.storagecache(),
                &mut self.caches,
            )
            .await
            {
                warn!(storage = pair.local.id(), error = %e, "failed to sync storage cache");
            }

            let Some((_guard, storage)) = self.lock_fresh::<Storage>(&pair.local).await else {
                continue;
            };
            self.reconcile(DiskKind, &storage, storage.name(), pair.remote.disks())
                .await;
        }
    }

    async fn sync_hosts(&mut self, hosts: Vec<SyncPair<HostKind>>) {
        for pair in hosts {
            if !self.ctx.range.needs_host(pair.local.id()) {
                continue;
            }
            let Some((_guard, host)) = self.lock_fresh::<Host>(&pair.local).await else {
                continue;
            };
            let remote = pair.remote.as_ref();

            let hoststorages = self
                .reconcile(HoststorageKind, &host, host.name(), remote.storages())
                .await;
            for hs in hoststorages.unwrap_or_default() {
                if let Err(e) = self.track_host_storagecache(&hs).await {
                    warn!(host = host.id(), error = %e, "failed to sync storage cache");
                }
            }

            self.reconcile(NetinterfaceKind, &host, host.name(), remote.nics())
                .await;

            if let Some(vms) = self
                .reconcile(GuestKind, &host, host.name(), remote.vms())
                .await
            {
                self.sync_guests(vms).await;
            }
        }
    }

    async fn track_host_storagecache(
        &mut self,
        pair: &SyncPair<HoststorageKind>,
    ) -> Result<(), ReconcileError> {
        let Some(storage) = self.ctx.store.get::<Storage>(&pair.local.storage_id).await? else {
            return Ok(());
        };
        track_storagecache(self.ctx, &storage, pair.remote.storagecache(), &mut self.caches).await
    }

    /// VM peripherals of existing VMs only change on deep syncs.
    async fn sync_guests(&mut self, vms: Vec<SyncPair<GuestKind>>) {
        for pair in vms {
            if !pair.is_new && !self.ctx.range.deep_sync {
                continue;
            }
            let Some((_guard, guest)) = self.lock_fresh::<Guest>(&pair.local).await else {
                continue;
            };
            let remote = pair.remote.as_ref();
            self.reconcile(GuestnetworkKind, &guest, guest.name(), remote.nics())
                .await;
            self.reconcile(GuestdiskKind, &guest, guest.name(), remote.disks())
                .await;
            self.sync_guest_eip(&guest, remote).await;
        }
    }

    /// Points the elastic ip bound to `vm` at `guest` and unbinds any other
    /// address still pointing there.
    async fn sync_guest_eip(&mut self, guest: &Guest, vm: &dyn CloudVm) {
        if !self.capabilities.network || !self.ctx.range.is_not_skip(Elasticip::KIND) {
            return;
        }
        let remote = match self.ctx.fetch("eip", vm.eip()).await {
            Ok(remote) => remote,
            Err(e) => {
                error!("Fetch eip for {} failed: {}", guest.name(), e);
                return;
            }
        };

        let mut result = SyncResult::default();
        let wanted = match &remote {
            Some(eip) => match self.ctx.find_external::<Elasticip>(&eip.global_id()).await {
                Ok(Some(local)) => Some(local),
                Ok(None) => {
                    result.add_error(format_args!(
                        "eip '{}' of {} is not synced",
                        eip.global_id(),
                        guest.name()
                    ));
                    None
                }
                Err(e) => {
                    result.add_error(e);
                    None
                }
            },
            None => None,
        };

        let scope = Scope::managed_by(self.ctx.provider.id.as_str()).with("associate_id", guest.id());
        let bound = match self.ctx.store.query::<Elasticip>(&scope).await {
            Ok(bound) => bound,
            Err(e) => {
                result.error(e);
                Vec::new()
            }
        };

        for eip in bound {
            if wanted.as_ref().is_some_and(|w| w.id() == eip.id()) {
                continue;
            }
            match self.set_eip_association(&eip, "").await {
                Ok(true) => result.update(),
                Ok(false) => {}
                Err(e) => result.update_error(e),
            }
        }
        if let Some(eip) = wanted {
            match self.set_eip_association(&eip, guest.id()).await {
                Ok(true) => result.update(),
                Ok(false) => {}
                Err(e) => result.update_error(e),
            }
        }

        self.results.add(Elasticip::KIND, &result);
        if result.has_adds_or_updates() || result.has_item_errors() {
            info!("Sync eip for {} result: {}", guest.name(), result);
        }
    }

    async fn set_eip_association(&self, eip: &Elasticip, guest_id: &str) -> Result<bool, ReconcileError> {
        let _guard = self.ctx.locks.lock_object(Elasticip::KIND, eip.id()).await;
        let Some(current) = self.ctx.store.get::<Elasticip>(eip.id()).await? else {
            return Ok(false);
        };
        let (_, diff) = self
            .ctx
            .store
            .update_with(&current, |e: &mut Elasticip| {
                e.associate_id = guest_id.to_string();
                Ok::<(), ReconcileError>(())
            })
            .await?;
        Ok(!diff.is_empty())
    }

    async fn sync_loadbalancers(&mut self, region: &Cloudregion, remote: &dyn CloudRegion) {
        self.reconcile(LbAclKind, region, region.name(), remote.lb_acls())
            .await;
        self.reconcile(LbCertificateKind, region, region.name(), remote.lb_certificates())
            .await;

        let Some(lbs) = self
            .reconcile(LoadbalancerKind, region, region.name(), remote.loadbalancers())
            .await
        else {
            return;
        };

        for pair in lbs {
            let Some((_guard, lb)) = self.lock_fresh::<Loadbalancer>(&pair.local).await else {
                continue;
            };
            let remote = pair.remote.as_ref();

            if let Some(groups) = self
                .reconcile(LbBackendGroupKind, &lb, lb.name(), remote.backend_groups())
                .await
            {
                for group in groups {
                    let Some((_guard, local)) = self
                        .lock_fresh::<LoadbalancerBackendGroup>(&group.local)
                        .await
                    else {
                        continue;
                    };
                    self.reconcile(LbBackendKind, &local, local.name(), group.remote.backends())
                        .await;
                }
            }

            if let Some(listeners) = self
                .reconcile(LbListenerKind, &lb, lb.name(), remote.listeners())
                .await
            {
                for listener in listeners {
                    let Some((_guard, local)) = self
                        .lock_fresh::<LoadbalancerListener>(&listener.local)
                        .await
                    else {
                        continue;
                    };
                    self.reconcile(LbListenerRuleKind, &local, local.name(), listener.remote.rules())
                        .await;
                }
            }
        }
    }

    /// One image pass per distinct cache. Public-cloud caches that already
    /// existed are only re-read on deep syncs.
    async fn sync_cached_images(&mut self) {
        let caches = std::mem::take(&mut self.caches);
        for pair in caches.iter() {
            if !pair.is_new && !self.ctx.range.deep_sync && self.is_public_cloud {
                continue;
            }
            self.reconcile(CachedimageKind, &pair.local, pair.local.name(), pair.remote.images())
                .await;
        }
        self.caches = caches;
    }
}

/// Reconciles the region records of a provider against `remote`.
pub async fn sync_regions(
    ctx: &SyncContext,
    remote: Vec<Arc<dyn CloudRegion>>,
) -> Reconciled<CloudregionKind> {
    let reconciled = Reconciler::new(CloudregionKind).sync(ctx, &(), remote).await;
    info!(
        "Sync {} for {} result: {}",
        Cloudregion::KIND,
        ctx.provider.name,
        reconciled.result
    );
    reconciled
}
