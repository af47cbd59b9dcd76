//! Storage, host and guest records.

use serde::{Deserialize, Serialize};

use super::ResourceBase;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Storage {
    #[serde(flatten)]
    pub base: ResourceBase,
    pub zone_id: String,
    #[serde(default)]
    pub storage_type: String,
    #[serde(default)]
    pub capacity_mb: u64,
    #[serde(default)]
    pub storagecache_id: String,
}

/// Image cache attached to one or more storages. Scoped by provider only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Storagecache {
    #[serde(flatten)]
    pub base: ResourceBase,
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cachedimage {
    #[serde(flatten)]
    pub base: ResourceBase,
    pub storagecache_id: String,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default)]
    pub os_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Disk {
    #[serde(flatten)]
    pub base: ResourceBase,
    pub storage_id: String,
    #[serde(default)]
    pub disk_size_mb: u64,
    #[serde(default)]
    pub disk_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Host {
    #[serde(flatten)]
    pub base: ResourceBase,
    pub zone_id: String,
    #[serde(default)]
    pub access_ip: String,
    #[serde(default)]
    pub cpu_count: u32,
    #[serde(default)]
    pub mem_size_mb: u64,
}

/// Attachment of a storage to a host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hoststorage {
    #[serde(flatten)]
    pub base: ResourceBase,
    pub host_id: String,
    pub storage_id: String,
}

/// Physical NIC of a host. External id is the MAC address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Netinterface {
    #[serde(flatten)]
    pub base: ResourceBase,
    pub host_id: String,
    #[serde(default)]
    pub mac: String,
    #[serde(default)]
    pub ip_addr: String,
    #[serde(default)]
    pub wire_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Guest {
    #[serde(flatten)]
    pub base: ResourceBase,
    pub host_id: String,
    #[serde(default)]
    pub vcpu_count: u32,
    #[serde(default)]
    pub vmem_size_mb: u64,
    #[serde(default)]
    pub os_type: String,
}

/// Guest NIC bound to a network.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Guestnetwork {
    #[serde(flatten)]
    pub base: ResourceBase,
    pub guest_id: String,
    pub network_id: String,
    #[serde(default)]
    pub mac: String,
    #[serde(default)]
    pub ip_addr: String,
}

/// Disk attached to a guest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Guestdisk {
    #[serde(flatten)]
    pub base: ResourceBase,
    pub guest_id: String,
    pub disk_id: String,
    #[serde(default)]
    pub index: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(flatten)]
    pub base: ResourceBase,
    pub cloudregion_id: String,
    /// Local disk id, empty when the source disk is not known locally.
    #[serde(default)]
    pub disk_id: String,
    #[serde(default)]
    pub size_mb: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerSku {
    #[serde(flatten)]
    pub base: ResourceBase,
    pub cloudregion_id: String,
    #[serde(default)]
    pub cpu_core_count: u32,
    #[serde(default)]
    pub memory_size_mb: u64,
    #[serde(default)]
    pub instance_type_family: String,
}

impl_record!(Storage, "storages");
impl_record!(Storagecache, "storagecaches");
impl_record!(Cachedimage, "cachedimages");
impl_record!(Disk, "disks");
impl_record!(Host, "hosts");
impl_record!(Hoststorage, "hoststorages");
impl_record!(Netinterface, "netinterfaces");
impl_record!(Guest, "guests");
impl_record!(Guestnetwork, "guestnetworks");
impl_record!(Guestdisk, "guestdisks");
impl_record!(Snapshot, "snapshots");
impl_record!(ServerSku, "serverskus");

impl_scoped!(region: Snapshot, ServerSku);
impl_scoped!(zone: Storage, Host);
