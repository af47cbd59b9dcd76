use async_trait::async_trait;

use super::{child_scope, mark_unknown, region_scope, resolve_optional, resolve_required};
use crate::cloud::{
    CloudDisk, CloudHost, CloudHostNic, CloudImage, CloudSku, CloudSnapshot, CloudStorage,
    CloudVm, CloudVmNic,
};
use crate::model::{
    Cachedimage, Cloudregion, Disk, Guest, Guestdisk, Guestnetwork, Host, Hoststorage,
    Netinterface, Network, Record, ServerSku, Snapshot, Storage, Storagecache, Wire, Zone,
};
use crate::reconcile::{ReconcileError, SyncContext, SyncKind};
use crate::store::{ChildRef, Scope};

pub struct StorageKind;

#[async_trait]
impl SyncKind for StorageKind {
    type Local = Storage;
    type Remote = dyn CloudStorage;
    type Parent = Zone;
    type Refs = ();

    const DELETE_GUARDS: &'static [ChildRef] = &[
        ChildRef::new(Disk::KIND, "storage_id"),
        ChildRef::new(Hoststorage::KIND, "storage_id"),
    ];

    fn scope(&self, zone: &Zone, ctx: &SyncContext) -> Scope {
        child_scope(ctx, "zone_id", zone.id())
    }

    fn create(&self, remote: &Self::Remote, zone: &Zone, _: &(), ctx: &SyncContext) -> Storage {
        let mut storage = Storage {
            base: ctx.new_base(remote),
            ..Default::default()
        };
        self.update(&mut storage, remote, zone, &());
        storage
    }

    // storagecache_id is maintained by the storage-cache pass.
    fn update(&self, local: &mut Storage, remote: &Self::Remote, zone: &Zone, _: &()) {
        local.zone_id = zone.id().to_string();
        local.storage_type = remote.storage_type();
        local.capacity_mb = remote.capacity_mb();
    }
}

pub struct DiskKind;

#[async_trait]
impl SyncKind for DiskKind {
    type Local = Disk;
    type Remote = dyn CloudDisk;
    type Parent = Storage;
    type Refs = ();

    const DELETE_GUARDS: &'static [ChildRef] = &[ChildRef::new(Guestdisk::KIND, "disk_id")];

    fn scope(&self, storage: &Storage, ctx: &SyncContext) -> Scope {
        child_scope(ctx, "storage_id", storage.id())
    }

    fn create(&self, remote: &Self::Remote, storage: &Storage, _: &(), ctx: &SyncContext) -> Disk {
        let mut disk = Disk {
            base: ctx.new_base(remote),
            ..Default::default()
        };
        self.update(&mut disk, remote, storage, &());
        disk
    }

    fn update(&self, local: &mut Disk, remote: &Self::Remote, storage: &Storage, _: &()) {
        local.storage_id = storage.id().to_string();
        local.disk_size_mb = remote.size_mb();
        local.disk_type = remote.disk_type();
    }
}

pub struct HostKind;

#[async_trait]
impl SyncKind for HostKind {
    type Local = Host;
    type Remote = dyn CloudHost;
    type Parent = Zone;
    type Refs = ();

    const DELETE_GUARDS: &'static [ChildRef] = &[ChildRef::new(Guest::KIND, "host_id")];

    const OWNED_CHILDREN: &'static [ChildRef] = &[
        ChildRef::new(Hoststorage::KIND, "host_id"),
        ChildRef::new(Netinterface::KIND, "host_id"),
    ];

    fn scope(&self, zone: &Zone, ctx: &SyncContext) -> Scope {
        child_scope(ctx, "zone_id", zone.id())
    }

    async fn delete_blocked(&self, host: &Host, ctx: &SyncContext) -> Result<u64, ReconcileError> {
        mark_unknown::<Guest>(ctx, "host_id", host.id()).await
    }

    fn create(&self, remote: &Self::Remote, zone: &Zone, _: &(), ctx: &SyncContext) -> Host {
        let mut host = Host {
            base: ctx.new_base(remote),
            ..Default::default()
        };
        self.update(&mut host, remote, zone, &());
        host
    }

    fn update(&self, local: &mut Host, remote: &Self::Remote, zone: &Zone, _: &()) {
        local.zone_id = zone.id().to_string();
        local.access_ip = remote.access_ip();
        local.cpu_count = remote.cpu_count();
        local.mem_size_mb = remote.mem_size_mb();
    }
}

/// Attachment of a storage to a host. Shares its external id with the
/// storage it points at.
pub struct HoststorageKind;

#[async_trait]
impl SyncKind for HoststorageKind {
    type Local = Hoststorage;
    type Remote = dyn CloudStorage;
    type Parent = Host;
    /// Local storage id.
    type Refs = String;

    fn scope(&self, host: &Host, ctx: &SyncContext) -> Scope {
        child_scope(ctx, "host_id", host.id())
    }

    async fn resolve(
        &self,
        remote: &Self::Remote,
        _host: &Host,
        ctx: &SyncContext,
    ) -> Result<String, ReconcileError> {
        resolve_required::<Storage>(ctx, Some(remote.global_id())).await
    }

    fn create(&self, remote: &Self::Remote, host: &Host, storage_id: &String, ctx: &SyncContext) -> Hoststorage {
        Hoststorage {
            base: ctx.new_base(remote),
            host_id: host.id().to_string(),
            storage_id: storage_id.clone(),
        }
    }

    fn update(&self, local: &mut Hoststorage, _remote: &Self::Remote, host: &Host, storage_id: &String) {
        local.host_id = host.id().to_string();
        local.storage_id = storage_id.clone();
    }
}

pub struct NetinterfaceKind;

#[async_trait]
impl SyncKind for NetinterfaceKind {
    type Local = Netinterface;
    type Remote = dyn CloudHostNic;
    type Parent = Host;
    /// Local wire id, empty if the wire is not synced.
    type Refs = String;

    fn scope(&self, host: &Host, ctx: &SyncContext) -> Scope {
        child_scope(ctx, "host_id", host.id())
    }

    async fn resolve(
        &self,
        remote: &Self::Remote,
        _host: &Host,
        ctx: &SyncContext,
    ) -> Result<String, ReconcileError> {
        resolve_optional::<Wire>(ctx, remote.wire_id()).await
    }

    fn create(&self, remote: &Self::Remote, host: &Host, wire_id: &String, ctx: &SyncContext) -> Netinterface {
        let mut nic = Netinterface {
            base: ctx.new_base(remote),
            ..Default::default()
        };
        self.update(&mut nic, remote, host, wire_id);
        nic
    }

    fn update(&self, local: &mut Netinterface, remote: &Self::Remote, host: &Host, wire_id: &String) {
        local.host_id = host.id().to_string();
        local.mac = remote.mac();
        local.ip_addr = remote.ip_addr();
        local.wire_id = wire_id.clone();
    }
}

pub struct GuestKind;

#[async_trait]
impl SyncKind for GuestKind {
    type Local = Guest;
    type Remote = dyn CloudVm;
    type Parent = Host;
    type Refs = ();

    const OWNED_CHILDREN: &'static [ChildRef] = &[
        ChildRef::new(Guestnetwork::KIND, "guest_id"),
        ChildRef::new(Guestdisk::KIND, "guest_id"),
    ];

    fn scope(&self, host: &Host, ctx: &SyncContext) -> Scope {
        child_scope(ctx, "host_id", host.id())
    }

    fn create(&self, remote: &Self::Remote, host: &Host, _: &(), ctx: &SyncContext) -> Guest {
        let mut guest = Guest {
            base: ctx.new_base(remote),
            ..Default::default()
        };
        self.update(&mut guest, remote, host, &());
        guest
    }

    fn update(&self, local: &mut Guest, remote: &Self::Remote, host: &Host, _: &()) {
        local.host_id = host.id().to_string();
        local.vcpu_count = remote.vcpu_count();
        local.vmem_size_mb = remote.vmem_size_mb();
        local.os_type = remote.os_type();
    }
}

pub struct GuestnetworkKind;

#[async_trait]
impl SyncKind for GuestnetworkKind {
    type Local = Guestnetwork;
    type Remote = dyn CloudVmNic;
    type Parent = Guest;
    /// Local network id.
    type Refs = String;

    fn scope(&self, guest: &Guest, ctx: &SyncContext) -> Scope {
        child_scope(ctx, "guest_id", guest.id())
    }

    async fn resolve(
        &self,
        remote: &Self::Remote,
        _guest: &Guest,
        ctx: &SyncContext,
    ) -> Result<String, ReconcileError> {
        resolve_required::<Network>(ctx, Some(remote.network_id())).await
    }

    fn create(
        &self,
        remote: &Self::Remote,
        guest: &Guest,
        network_id: &String,
        ctx: &SyncContext,
    ) -> Guestnetwork {
        let mut nic = Guestnetwork {
            base: ctx.new_base(remote),
            ..Default::default()
        };
        self.update(&mut nic, remote, guest, network_id);
        nic
    }

    fn update(&self, local: &mut Guestnetwork, remote: &Self::Remote, guest: &Guest, network_id: &String) {
        local.guest_id = guest.id().to_string();
        local.network_id = network_id.clone();
        local.mac = remote.mac();
        local.ip_addr = remote.ip_addr();
    }
}

#[derive(Debug, Default)]
pub struct GuestdiskRefs {
    pub disk_id: String,
    /// Slot a newly attached disk gets.
    pub next_index: u32,
}

pub struct GuestdiskKind;

#[async_trait]
impl SyncKind for GuestdiskKind {
    type Local = Guestdisk;
    type Remote = dyn CloudDisk;
    type Parent = Guest;
    type Refs = GuestdiskRefs;

    fn scope(&self, guest: &Guest, ctx: &SyncContext) -> Scope {
        child_scope(ctx, "guest_id", guest.id())
    }

    async fn resolve(
        &self,
        remote: &Self::Remote,
        guest: &Guest,
        ctx: &SyncContext,
    ) -> Result<GuestdiskRefs, ReconcileError> {
        let disk_id = resolve_required::<Disk>(ctx, Some(remote.global_id())).await?;
        let attached: Vec<Guestdisk> = ctx
            .store
            .query(&Scope::all().with("guest_id", guest.id()))
            .await?;
        let next_index = attached.iter().map(|d| d.index + 1).max().unwrap_or(0);
        Ok(GuestdiskRefs {
            disk_id,
            next_index,
        })
    }

    fn create(
        &self,
        remote: &Self::Remote,
        guest: &Guest,
        refs: &GuestdiskRefs,
        ctx: &SyncContext,
    ) -> Guestdisk {
        Guestdisk {
            base: ctx.new_base(remote),
            guest_id: guest.id().to_string(),
            disk_id: refs.disk_id.clone(),
            index: refs.next_index,
        }
    }

    fn update(&self, local: &mut Guestdisk, _remote: &Self::Remote, guest: &Guest, refs: &GuestdiskRefs) {
        local.guest_id = guest.id().to_string();
        local.disk_id = refs.disk_id.clone();
    }
}

pub struct SnapshotKind;

#[async_trait]
impl SyncKind for SnapshotKind {
    type Local = Snapshot;
    type Remote = dyn CloudSnapshot;
    type Parent = Cloudregion;
    /// Local id of the source disk, empty if it is not synced.
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
        resolve_optional::<Disk>(ctx, remote.disk_id()).await
    }

    fn create(
        &self,
        remote: &Self::Remote,
        region: &Cloudregion,
        disk_id: &String,
        ctx: &SyncContext,
    ) -> Snapshot {
        let mut snapshot = Snapshot {
            base: ctx.new_base(remote),
            ..Default::default()
        };
        self.update(&mut snapshot, remote, region, disk_id);
        snapshot
    }

    fn update(&self, local: &mut Snapshot, remote: &Self::Remote, region: &Cloudregion, disk_id: &String) {
        local.cloudregion_id = region.id().to_string();
        local.disk_id = disk_id.clone();
        local.size_mb = remote.size_mb();
    }
}

pub struct ServerSkuKind;

#[async_trait]
impl SyncKind for ServerSkuKind {
    type Local = ServerSku;
    type Remote = dyn CloudSku;
    type Parent = Cloudregion;
    type Refs = ();

    fn scope(&self, region: &Cloudregion, ctx: &SyncContext) -> Scope {
        region_scope(ctx, region.id())
    }

    fn create(&self, remote: &Self::Remote, region: &Cloudregion, _: &(), ctx: &SyncContext) -> ServerSku {
        let mut sku = ServerSku {
            base: ctx.new_base(remote),
            ..Default::default()
        };
        self.update(&mut sku, remote, region, &());
        sku
    }

    fn update(&self, local: &mut ServerSku, remote: &Self::Remote, region: &Cloudregion, _: &()) {
        local.cloudregion_id = region.id().to_string();
        local.cpu_core_count = remote.cpu_core_count();
        local.memory_size_mb = remote.memory_size_mb();
        local.instance_type_family = remote.instance_type_family();
    }
}

pub struct CachedimageKind;

#[async_trait]
impl SyncKind for CachedimageKind {
    type Local = Cachedimage;
    type Remote = dyn CloudImage;
    type Parent = Storagecache;
    type Refs = ();

    fn scope(&self, cache: &Storagecache, ctx: &SyncContext) -> Scope {
        child_scope(ctx, "storagecache_id", cache.id())
    }

    fn create(&self, remote: &Self::Remote, cache: &Storagecache, _: &(), ctx: &SyncContext) -> Cachedimage {
        let mut image = Cachedimage {
            base: ctx.new_base(remote),
            ..Default::default()
        };
        self.update(&mut image, remote, cache, &());
        image
    }

    fn update(&self, local: &mut Cachedimage, remote: &Self::Remote, cache: &Storagecache, _: &()) {
        local.storagecache_id = cache.id().to_string();
        local.size_bytes = remote.size_bytes();
        local.os_type = remote.os_type();
    }
}
