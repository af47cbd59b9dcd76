//! Remote provider interfaces.
//!
//! A driver exposes a provider as a tree of trait objects rooted at
//! [`CloudProvider`]. Child collections are fetched asynchronously and may
//! fail independently; scalar attributes are plain getters on data the
//! driver already holds.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod error;
pub mod inventory;

pub use error::{CloudError, CloudResult};
pub use inventory::{Inventory, InventoryNode, InventoryProvider};

/// What every remote resource reports.
pub trait CloudResource: Send + Sync {
    /// Provider-unique identity. Never empty for a well-behaved driver.
    fn global_id(&self) -> String;
    fn name(&self) -> String;
    fn status(&self) -> String;

    fn tags(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    /// Remote project the resource belongs to, if the provider has projects.
    fn project_id(&self) -> Option<String> {
        None
    }
}

/// Feature groups a provider supports. Disabled groups are not synced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default = "enabled")]
    pub compute: bool,
    #[serde(default = "enabled")]
    pub network: bool,
    #[serde(default = "enabled")]
    pub loadbalancer: bool,
    /// Whether server SKUs are read from the provider.
    #[serde(default = "enabled")]
    pub sku_from_cloud: bool,
}

fn enabled() -> bool {
    true
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            compute: true,
            network: true,
            loadbalancer: true,
            sku_from_cloud: true,
        }
    }
}

#[async_trait]
pub trait CloudProvider: Send + Sync {
    fn capabilities(&self) -> Capabilities;

    fn is_public_cloud(&self) -> bool;

    fn is_on_premise(&self) -> bool;

    async fn regions(&self) -> CloudResult<Vec<Arc<dyn CloudRegion>>>;

    async fn region_by_id(&self, global_id: &str) -> CloudResult<Arc<dyn CloudRegion>>;

    /// The single implicit region of an on-premise provider.
    async fn on_premise_region(&self) -> CloudResult<Arc<dyn CloudRegion>>;
}

#[async_trait]
pub trait CloudRegion: CloudResource {
    async fn zones(&self) -> CloudResult<Vec<Arc<dyn CloudZone>>>;
    async fn vpcs(&self) -> CloudResult<Vec<Arc<dyn CloudVpc>>>;
    async fn eips(&self) -> CloudResult<Vec<Arc<dyn CloudEip>>>;
    async fn snapshots(&self) -> CloudResult<Vec<Arc<dyn CloudSnapshot>>>;
    async fn skus(&self) -> CloudResult<Vec<Arc<dyn CloudSku>>>;
    async fn lb_acls(&self) -> CloudResult<Vec<Arc<dyn CloudLbAcl>>>;
    async fn lb_certificates(&self) -> CloudResult<Vec<Arc<dyn CloudLbCertificate>>>;
    async fn loadbalancers(&self) -> CloudResult<Vec<Arc<dyn CloudLoadbalancer>>>;
    /// Hosts directly under the region. On-premise only.
    async fn hosts(&self) -> CloudResult<Vec<Arc<dyn CloudHost>>>;
    /// Storages directly under the region. On-premise only.
    async fn storages(&self) -> CloudResult<Vec<Arc<dyn CloudStorage>>>;
}

#[async_trait]
pub trait CloudZone: CloudResource {
    async fn hosts(&self) -> CloudResult<Vec<Arc<dyn CloudHost>>>;
    async fn storages(&self) -> CloudResult<Vec<Arc<dyn CloudStorage>>>;
}

#[async_trait]
pub trait CloudVpc: CloudResource {
    fn cidr_block(&self) -> String;
    fn is_default(&self) -> bool;
    async fn wires(&self) -> CloudResult<Vec<Arc<dyn CloudWire>>>;
    async fn secgroups(&self) -> CloudResult<Vec<Arc<dyn CloudSecgroup>>>;
    async fn route_tables(&self) -> CloudResult<Vec<Arc<dyn CloudRouteTable>>>;
}

#[async_trait]
pub trait CloudWire: CloudResource {
    fn bandwidth(&self) -> u32;
    /// Global id of the zone the wire lives in, if zonal.
    fn zone_id(&self) -> Option<String>;
    async fn networks(&self) -> CloudResult<Vec<Arc<dyn CloudNetwork>>>;
}

pub trait CloudNetwork: CloudResource {
    fn ip_start(&self) -> String;
    fn ip_end(&self) -> String;
    fn ip_mask(&self) -> u8;
    fn gateway(&self) -> String;
}

pub trait CloudSecgroup: CloudResource {
    fn description(&self) -> String;
}

pub trait CloudRouteTable: CloudResource {
    fn routes(&self) -> Vec<String>;
}

pub trait CloudEip: CloudResource {
    fn ip_addr(&self) -> String;
    fn bandwidth(&self) -> u32;
    /// Global id of the VM the address is bound to.
    fn associated_vm_id(&self) -> Option<String>;
}

#[async_trait]
pub trait CloudStorage: CloudResource {
    fn storage_type(&self) -> String;
    fn capacity_mb(&self) -> u64;
    fn storagecache(&self) -> Option<Arc<dyn CloudStoragecache>>;
    async fn disks(&self) -> CloudResult<Vec<Arc<dyn CloudDisk>>>;
}

#[async_trait]
pub trait CloudStoragecache: CloudResource {
    fn path(&self) -> String;
    async fn images(&self) -> CloudResult<Vec<Arc<dyn CloudImage>>>;
}

pub trait CloudImage: CloudResource {
    fn size_bytes(&self) -> u64;
    fn os_type(&self) -> String;
}

pub trait CloudDisk: CloudResource {
    fn size_mb(&self) -> u64;
    fn disk_type(&self) -> String;
}

#[async_trait]
pub trait CloudHost: CloudResource {
    fn access_ip(&self) -> String;
    fn cpu_count(&self) -> u32;
    fn mem_size_mb(&self) -> u64;
    async fn storages(&self) -> CloudResult<Vec<Arc<dyn CloudStorage>>>;
    async fn nics(&self) -> CloudResult<Vec<Arc<dyn CloudHostNic>>>;
    async fn vms(&self) -> CloudResult<Vec<Arc<dyn CloudVm>>>;
}

pub trait CloudHostNic: CloudResource {
    fn mac(&self) -> String;
    fn ip_addr(&self) -> String;
    /// Global id of the wire the NIC is plugged into.
    fn wire_id(&self) -> Option<String>;
}

#[async_trait]
pub trait CloudVm: CloudResource {
    fn vcpu_count(&self) -> u32;
    fn vmem_size_mb(&self) -> u64;
    fn os_type(&self) -> String;
    async fn nics(&self) -> CloudResult<Vec<Arc<dyn CloudVmNic>>>;
    async fn disks(&self) -> CloudResult<Vec<Arc<dyn CloudDisk>>>;
    async fn eip(&self) -> CloudResult<Option<Arc<dyn CloudEip>>>;
}

pub trait CloudVmNic: CloudResource {
    fn mac(&self) -> String;
    fn ip_addr(&self) -> String;
    /// Global id of the network the NIC is attached to.
    fn network_id(&self) -> String;
}

pub trait CloudSnapshot: CloudResource {
    /// Global id of the source disk.
    fn disk_id(&self) -> Option<String>;
    fn size_mb(&self) -> u64;
}

pub trait CloudSku: CloudResource {
    fn cpu_core_count(&self) -> u32;
    fn memory_size_mb(&self) -> u64;
    fn instance_type_family(&self) -> String;
}

pub trait CloudLbAcl: CloudResource {
    fn entries(&self) -> Vec<String>;
}

pub trait CloudLbCertificate: CloudResource {
    fn fingerprint(&self) -> String;
    fn common_name(&self) -> String;
    fn not_after(&self) -> Option<DateTime<Utc>>;
}

#[async_trait]
pub trait CloudLoadbalancer: CloudResource {
    fn address(&self) -> String;
    fn address_type(&self) -> String;
    async fn backend_groups(&self) -> CloudResult<Vec<Arc<dyn CloudLbBackendGroup>>>;
    async fn listeners(&self) -> CloudResult<Vec<Arc<dyn CloudLbListener>>>;
}

#[async_trait]
pub trait CloudLbBackendGroup: CloudResource {
    fn group_type(&self) -> String;
    async fn backends(&self) -> CloudResult<Vec<Arc<dyn CloudLbBackend>>>;
}

pub trait CloudLbBackend: CloudResource {
    /// Global id of the backing VM.
    fn backend_id(&self) -> Option<String>;
    fn port(&self) -> u16;
    fn weight(&self) -> u32;
}

#[async_trait]
pub trait CloudLbListener: CloudResource {
    fn protocol(&self) -> String;
    fn port(&self) -> u16;
    fn backend_group_id(&self) -> Option<String>;
    fn acl_id(&self) -> Option<String>;
    fn certificate_id(&self) -> Option<String>;
    async fn rules(&self) -> CloudResult<Vec<Arc<dyn CloudLbListenerRule>>>;
}

pub trait CloudLbListenerRule: CloudResource {
    fn domain(&self) -> String;
    fn path(&self) -> String;
    fn backend_group_id(&self) -> Option<String>;
}
