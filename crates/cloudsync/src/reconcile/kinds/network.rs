use async_trait::async_trait;

use super::{child_scope, mark_unknown, region_scope, resolve_optional};
use crate::cloud::{
    CloudEip, CloudNetwork, CloudRegion, CloudRouteTable, CloudSecgroup, CloudVpc, CloudWire,
    CloudZone,
};
use crate::lock::LockKey;
use crate::model::{
    Cloudregion, Elasticip, Guest, Guestnetwork, Host, Netinterface, Network, Record, RouteTable,
    Secgroup, Storage, Vpc, Wire, Zone,
};
use crate::reconcile::{ReconcileError, SyncContext, SyncKind};
use crate::store::{ChildRef, Scope};

pub struct CloudregionKind;

#[async_trait]
impl SyncKind for CloudregionKind {
    type Local = Cloudregion;
    type Remote = dyn CloudRegion;
    type Parent = ();
    type Refs = ();

    const DELETE_GUARDS: &'static [ChildRef] = &[
        ChildRef::new(Zone::KIND, "cloudregion_id"),
        ChildRef::new(Vpc::KIND, "cloudregion_id"),
    ];

    fn scope(&self, _parent: &(), ctx: &SyncContext) -> Scope {
        Scope::managed_by(ctx.provider.id.as_str())
    }

    fn set_lock(&self, _parent: &(), ctx: &SyncContext) -> Option<LockKey> {
        Some(LockKey::raw(Cloudregion::KIND, ctx.provider.id.as_str()))
    }

    fn create(&self, remote: &Self::Remote, _: &(), _: &(), ctx: &SyncContext) -> Cloudregion {
        Cloudregion {
            base: ctx.new_base(remote),
            provider: ctx.provider.brand.clone(),
        }
    }

    fn update(&self, _local: &mut Cloudregion, _remote: &Self::Remote, _: &(), _: &()) {}
}

pub struct ZoneKind;

#[async_trait]
impl SyncKind for ZoneKind {
    type Local = Zone;
    type Remote = dyn CloudZone;
    type Parent = Cloudregion;
    type Refs = ();

    const DELETE_GUARDS: &'static [ChildRef] = &[
        ChildRef::new(Host::KIND, "zone_id"),
        ChildRef::new(Storage::KIND, "zone_id"),
        ChildRef::new(Wire::KIND, "zone_id"),
    ];

    fn scope(&self, region: &Cloudregion, ctx: &SyncContext) -> Scope {
        region_scope(ctx, region.id())
    }

    fn create(&self, remote: &Self::Remote, region: &Cloudregion, _: &(), ctx: &SyncContext) -> Zone {
        Zone {
            base: ctx.new_base(remote),
            cloudregion_id: region.id().to_string(),
        }
    }

    fn update(&self, local: &mut Zone, _remote: &Self::Remote, region: &Cloudregion, _: &()) {
        local.cloudregion_id = region.id().to_string();
    }
}

pub struct VpcKind;

#[async_trait]
impl SyncKind for VpcKind {
    type Local = Vpc;
    type Remote = dyn CloudVpc;
    type Parent = Cloudregion;
    type Refs = ();

    const OWNED_CHILDREN: &'static [ChildRef] = &[
        ChildRef::new(Secgroup::KIND, "vpc_id"),
        ChildRef::new(RouteTable::KIND, "vpc_id"),
        ChildRef::new(Wire::KIND, "vpc_id"),
    ];

    fn scope(&self, region: &Cloudregion, ctx: &SyncContext) -> Scope {
        region_scope(ctx, region.id())
    }

    /// Wires are only walked under live VPCs, so a removed VPC takes its
    /// networks with it.
    async fn purge_nested(&self, vpc: &Vpc, ctx: &SyncContext) -> Result<u64, ReconcileError> {
        let mut purged = 0;
        let wires = ctx
            .store
            .query::<Wire>(&Scope::all().with("vpc_id", vpc.id()))
            .await?;
        for wire in wires {
            let networks = ctx
                .store
                .query::<Network>(&Scope::all().with("wire_id", wire.id()))
                .await?;
            for network in networks {
                purged += ctx
                    .store
                    .delete_referencing(ChildRef::new(Guestnetwork::KIND, "network_id"), network.id())
                    .await?;
            }
            purged += ctx
                .store
                .delete_referencing(ChildRef::new(Network::KIND, "wire_id"), wire.id())
                .await?;
        }
        Ok(purged)
    }

    fn create(&self, remote: &Self::Remote, region: &Cloudregion, _: &(), ctx: &SyncContext) -> Vpc {
        let mut vpc = Vpc {
            base: ctx.new_base(remote),
            cloudregion_id: region.id().to_string(),
            ..Default::default()
        };
        self.update(&mut vpc, remote, region, &());
        vpc
    }

    fn update(&self, local: &mut Vpc, remote: &Self::Remote, region: &Cloudregion, _: &()) {
        local.cloudregion_id = region.id().to_string();
        local.cidr_block = remote.cidr_block();
        local.is_default = remote.is_default();
    }
}

/// Wires hang off a VPC. On-premise wires get their zone from the local
/// region, public-cloud wires name theirs remotely.
pub struct WireParent {
    pub vpc: Vpc,
    pub zone: Option<Zone>,
}

pub struct WireKind;

#[async_trait]
impl SyncKind for WireKind {
    type Local = Wire;
    type Remote = dyn CloudWire;
    type Parent = WireParent;
    /// Local zone id.
    type Refs = String;

    const DELETE_GUARDS: &'static [ChildRef] = &[
        ChildRef::new(Network::KIND, "wire_id"),
        ChildRef::new(Netinterface::KIND, "wire_id"),
    ];

    fn scope(&self, parent: &WireParent, ctx: &SyncContext) -> Scope {
        child_scope(ctx, "vpc_id", parent.vpc.id())
    }

    async fn delete_blocked(&self, wire: &Wire, ctx: &SyncContext) -> Result<u64, ReconcileError> {
        mark_unknown::<Network>(ctx, "wire_id", wire.id()).await
    }

    async fn resolve(
        &self,
        remote: &Self::Remote,
        parent: &WireParent,
        ctx: &SyncContext,
    ) -> Result<String, ReconcileError> {
        match &parent.zone {
            Some(zone) => Ok(zone.id().to_string()),
            None => resolve_optional::<Zone>(ctx, remote.zone_id()).await,
        }
    }

    fn create(
        &self,
        remote: &Self::Remote,
        parent: &WireParent,
        zone_id: &String,
        ctx: &SyncContext,
    ) -> Wire {
        let mut wire = Wire {
            base: ctx.new_base(remote),
            ..Default::default()
        };
        self.update(&mut wire, remote, parent, zone_id);
        wire
    }

    fn update(&self, local: &mut Wire, remote: &Self::Remote, parent: &WireParent, zone_id: &String) {
        local.vpc_id = parent.vpc.id().to_string();
        local.zone_id = zone_id.clone();
        local.bandwidth = remote.bandwidth();
    }
}

pub struct NetworkKind;

#[async_trait]
impl SyncKind for NetworkKind {
    type Local = Network;
    type Remote = dyn CloudNetwork;
    type Parent = Wire;
    type Refs = ();

    const DELETE_GUARDS: &'static [ChildRef] = &[ChildRef::new(Guestnetwork::KIND, "network_id")];

    fn scope(&self, wire: &Wire, ctx: &SyncContext) -> Scope {
        child_scope(ctx, "wire_id", wire.id())
    }

    fn create(&self, remote: &Self::Remote, wire: &Wire, _: &(), ctx: &SyncContext) -> Network {
        let mut network = Network {
            base: ctx.new_base(remote),
            ..Default::default()
        };
        self.update(&mut network, remote, wire, &());
        network
    }

    fn update(&self, local: &mut Network, remote: &Self::Remote, wire: &Wire, _: &()) {
        local.wire_id = wire.id().to_string();
        local.guest_ip_start = remote.ip_start();
        local.guest_ip_end = remote.ip_end();
        local.guest_ip_mask = remote.ip_mask();
        local.guest_gateway = remote.gateway();
    }
}

pub struct SecgroupKind;

#[async_trait]
impl SyncKind for SecgroupKind {
    type Local = Secgroup;
    type Remote = dyn CloudSecgroup;
    type Parent = Vpc;
    type Refs = ();

    fn scope(&self, vpc: &Vpc, ctx: &SyncContext) -> Scope {
        child_scope(ctx, "vpc_id", vpc.id())
    }

    fn create(&self, remote: &Self::Remote, vpc: &Vpc, _: &(), ctx: &SyncContext) -> Secgroup {
        Secgroup {
            base: ctx.new_base(remote),
            vpc_id: vpc.id().to_string(),
            description: remote.description(),
        }
    }

    fn update(&self, local: &mut Secgroup, remote: &Self::Remote, vpc: &Vpc, _: &()) {
        local.vpc_id = vpc.id().to_string();
        local.description = remote.description();
    }
}

pub struct RouteTableKind;

#[async_trait]
impl SyncKind for RouteTableKind {
    type Local = RouteTable;
    type Remote = dyn CloudRouteTable;
    type Parent = Vpc;
    type Refs = ();

    fn scope(&self, vpc: &Vpc, ctx: &SyncContext) -> Scope {
        child_scope(ctx, "vpc_id", vpc.id())
    }

    fn create(&self, remote: &Self::Remote, vpc: &Vpc, _: &(), ctx: &SyncContext) -> RouteTable {
        RouteTable {
            base: ctx.new_base(remote),
            vpc_id: vpc.id().to_string(),
            routes: remote.routes(),
        }
    }

    fn update(&self, local: &mut RouteTable, remote: &Self::Remote, vpc: &Vpc, _: &()) {
        local.vpc_id = vpc.id().to_string();
        local.routes = remote.routes();
    }
}

pub struct ElasticipKind;

#[async_trait]
impl SyncKind for ElasticipKind {
    type Local = Elasticip;
    type Remote = dyn CloudEip;
    type Parent = Cloudregion;
    /// Local id of the associated guest.
    type Refs = String;

    fn scope(&self, region: &Cloudregion, ctx: &SyncContext) -> Scope {
        region_scope(ctx, region.id())
    }

    async fn resolve(
        &self,
        remote: &Self::Remote,
        _region: &Cloudregion,
        ctx: &SyncContext,
    ) -> Result<String, ReconcileError> {
        resolve_optional::<Guest>(ctx, remote.associated_vm_id()).await
    }

    fn create(
        &self,
        remote: &Self::Remote,
        region: &Cloudregion,
        guest_id: &String,
        ctx: &SyncContext,
    ) -> Elasticip {
        let mut eip = Elasticip {
            base: ctx.new_base(remote),
            ..Default::default()
        };
        self.update(&mut eip, remote, region, guest_id);
        eip
    }

    fn update(&self, local: &mut Elasticip, remote: &Self::Remote, region: &Cloudregion, guest_id: &String) {
        local.cloudregion_id = region.id().to_string();
        local.ip_addr = remote.ip_addr();
        local.bandwidth = remote.bandwidth();
        local.associate_id = guest_id.clone();
    }
}
