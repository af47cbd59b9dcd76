//! Provider driver backed by a declarative YAML inventory.
//!
//! The inventory describes a provider as a tree of [`InventoryNode`]s. One
//! node type serves every remote kind: typed attributes come from `attrs`
//! and child collections from `children`, keyed by collection name
//! (`zones`, `vpcs`, `wires`, ...). A node's `id` is its global id.
//!
//! Nodes can inject faults: a collection named in `fail` errors when
//! fetched, and `delay_ms` stalls every fetch below the node. Swapping the
//! whole inventory with [`InventoryProvider::replace`] simulates remote
//! changes between syncs.
//!
//! ```yaml
//! regions:
//!   - id: region-1
//!     children:
//!       vpcs:
//!         - id: vpc-1
//!           attrs: { cidr_block: 10.0.0.0/16 }
//!           children:
//!             wires:
//!               - id: wire-1
//!                 attrs: { bandwidth: 1000 }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::*;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventoryNode {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub attrs: BTreeMap<String, Value>,
    #[serde(default)]
    pub children: BTreeMap<String, Vec<Arc<InventoryNode>>>,
    /// Collections whose fetch fails.
    #[serde(default)]
    pub fail: BTreeSet<String>,
    /// Delay applied to every child fetch of this node.
    #[serde(default)]
    pub delay_ms: u64,
}

impl InventoryNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attrs.insert(key.to_string(), value.into());
        self
    }

    pub fn with_child(mut self, collection: &str, child: InventoryNode) -> Self {
        self.children
            .entry(collection.to_string())
            .or_default()
            .push(Arc::new(child));
        self
    }

    async fn fetch(&self, collection: &str) -> CloudResult<Vec<Arc<InventoryNode>>> {
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        if self.fail.contains(collection) {
            return Err(CloudError::Unreachable(format!(
                "{} of '{}' unavailable",
                collection, self.id
            )));
        }
        Ok(self.children.get(collection).cloned().unwrap_or_default())
    }

    async fn single(&self, collection: &str) -> CloudResult<Option<Arc<InventoryNode>>> {
        Ok(self.fetch(collection).await?.into_iter().next())
    }

    fn attr_str(&self, key: &str) -> String {
        match self.attrs.get(key) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }

    fn attr_opt(&self, key: &str) -> Option<String> {
        Some(self.attr_str(key)).filter(|s| !s.is_empty())
    }

    fn attr_u64(&self, key: &str) -> u64 {
        self.attrs.get(key).and_then(Value::as_u64).unwrap_or(0)
    }

    fn attr_u32(&self, key: &str) -> u32 {
        u32::try_from(self.attr_u64(key)).unwrap_or(u32::MAX)
    }

    fn attr_u16(&self, key: &str) -> u16 {
        u16::try_from(self.attr_u64(key)).unwrap_or(u16::MAX)
    }

    fn attr_bool(&self, key: &str) -> bool {
        self.attrs.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    fn attr_list(&self, key: &str) -> Vec<String> {
        match self.attrs.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| v.as_str().map_or_else(|| v.to_string(), str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }
}

macro_rules! fetch_as {
    ($node:expr, $collection:literal, $tr:ident) => {
        Ok($node
            .fetch($collection)
            .await?
            .into_iter()
            .map(|n| n as Arc<dyn $tr>)
            .collect())
    };
}

impl CloudResource for InventoryNode {
    fn global_id(&self) -> String {
        self.id.clone()
    }

    fn name(&self) -> String {
        if self.name.is_empty() {
            self.id.clone()
        } else {
            self.name.clone()
        }
    }

    fn status(&self) -> String {
        if self.status.is_empty() {
            "available".to_string()
        } else {
            self.status.clone()
        }
    }

    fn tags(&self) -> BTreeMap<String, String> {
        self.tags.clone()
    }

    fn project_id(&self) -> Option<String> {
        self.project.clone()
    }
}

#[async_trait]
impl CloudRegion for InventoryNode {
    async fn zones(&self) -> CloudResult<Vec<Arc<dyn CloudZone>>> {
        fetch_as!(self, "zones", CloudZone)
    }

    async fn vpcs(&self) -> CloudResult<Vec<Arc<dyn CloudVpc>>> {
        fetch_as!(self, "vpcs", CloudVpc)
    }

    async fn eips(&self) -> CloudResult<Vec<Arc<dyn CloudEip>>> {
        fetch_as!(self, "eips", CloudEip)
    }

    async fn snapshots(&self) -> CloudResult<Vec<Arc<dyn CloudSnapshot>>> {
        fetch_as!(self, "snapshots", CloudSnapshot)
    }

    async fn skus(&self) -> CloudResult<Vec<Arc<dyn CloudSku>>> {
        fetch_as!(self, "skus", CloudSku)
    }

    async fn lb_acls(&self) -> CloudResult<Vec<Arc<dyn CloudLbAcl>>> {
        fetch_as!(self, "lb_acls", CloudLbAcl)
    }

    async fn lb_certificates(&self) -> CloudResult<Vec<Arc<dyn CloudLbCertificate>>> {
        fetch_as!(self, "lb_certificates", CloudLbCertificate)
    }

    async fn loadbalancers(&self) -> CloudResult<Vec<Arc<dyn CloudLoadbalancer>>> {
        fetch_as!(self, "loadbalancers", CloudLoadbalancer)
    }

    async fn hosts(&self) -> CloudResult<Vec<Arc<dyn CloudHost>>> {
        fetch_as!(self, "hosts", CloudHost)
    }

    async fn storages(&self) -> CloudResult<Vec<Arc<dyn CloudStorage>>> {
        fetch_as!(self, "storages", CloudStorage)
    }
}

#[async_trait]
impl CloudZone for InventoryNode {
    async fn hosts(&self) -> CloudResult<Vec<Arc<dyn CloudHost>>> {
        fetch_as!(self, "hosts", CloudHost)
    }

    async fn storages(&self) -> CloudResult<Vec<Arc<dyn CloudStorage>>> {
        fetch_as!(self, "storages", CloudStorage)
    }
}

#[async_trait]
impl CloudVpc for InventoryNode {
    fn cidr_block(&self) -> String {
        self.attr_str("cidr_block")
    }

    fn is_default(&self) -> bool {
        self.attr_bool("is_default")
    }

    async fn wires(&self) -> CloudResult<Vec<Arc<dyn CloudWire>>> {
        fetch_as!(self, "wires", CloudWire)
    }

    async fn secgroups(&self) -> CloudResult<Vec<Arc<dyn CloudSecgroup>>> {
        fetch_as!(self, "secgroups", CloudSecgroup)
    }

    async fn route_tables(&self) -> CloudResult<Vec<Arc<dyn CloudRouteTable>>> {
        fetch_as!(self, "route_tables", CloudRouteTable)
    }
}

#[async_trait]
impl CloudWire for InventoryNode {
    fn bandwidth(&self) -> u32 {
        self.attr_u32("bandwidth")
    }

    fn zone_id(&self) -> Option<String> {
        self.attr_opt("zone_id")
    }

    async fn networks(&self) -> CloudResult<Vec<Arc<dyn CloudNetwork>>> {
        fetch_as!(self, "networks", CloudNetwork)
    }
}

impl CloudNetwork for InventoryNode {
    fn ip_start(&self) -> String {
        self.attr_str("ip_start")
    }

    fn ip_end(&self) -> String {
        self.attr_str("ip_end")
    }

    fn ip_mask(&self) -> u8 {
        u8::try_from(self.attr_u64("ip_mask")).unwrap_or(0)
    }

    fn gateway(&self) -> String {
        self.attr_str("gateway")
    }
}

impl CloudSecgroup for InventoryNode {
    fn description(&self) -> String {
        self.attr_str("description")
    }
}

impl CloudRouteTable for InventoryNode {
    fn routes(&self) -> Vec<String> {
        self.attr_list("routes")
    }
}

impl CloudEip for InventoryNode {
    fn ip_addr(&self) -> String {
        self.attr_str("ip_addr")
    }

    fn bandwidth(&self) -> u32 {
        self.attr_u32("bandwidth")
    }

    fn associated_vm_id(&self) -> Option<String> {
        self.attr_opt("vm_id")
    }
}

#[async_trait]
impl CloudStorage for InventoryNode {
    fn storage_type(&self) -> String {
        self.attr_str("storage_type")
    }

    fn capacity_mb(&self) -> u64 {
        self.attr_u64("capacity_mb")
    }

    fn storagecache(&self) -> Option<Arc<dyn CloudStoragecache>> {
        self.children
            .get("storagecache")
            .and_then(|caches| caches.first())
            .map(|n| Arc::clone(n) as Arc<dyn CloudStoragecache>)
    }

    async fn disks(&self) -> CloudResult<Vec<Arc<dyn CloudDisk>>> {
        fetch_as!(self, "disks", CloudDisk)
    }
}

#[async_trait]
impl CloudStoragecache for InventoryNode {
    fn path(&self) -> String {
        self.attr_str("path")
    }

    async fn images(&self) -> CloudResult<Vec<Arc<dyn CloudImage>>> {
        fetch_as!(self, "images", CloudImage)
    }
}

impl CloudImage for InventoryNode {
    fn size_bytes(&self) -> u64 {
        self.attr_u64("size_bytes")
    }

    fn os_type(&self) -> String {
        self.attr_str("os_type")
    }
}

impl CloudDisk for InventoryNode {
    fn size_mb(&self) -> u64 {
        self.attr_u64("size_mb")
    }

    fn disk_type(&self) -> String {
        self.attr_str("disk_type")
    }
}

#[async_trait]
impl CloudHost for InventoryNode {
    fn access_ip(&self) -> String {
        self.attr_str("access_ip")
    }

    fn cpu_count(&self) -> u32 {
        self.attr_u32("cpu_count")
    }

    fn mem_size_mb(&self) -> u64 {
        self.attr_u64("mem_size_mb")
    }

    async fn storages(&self) -> CloudResult<Vec<Arc<dyn CloudStorage>>> {
        fetch_as!(self, "storages", CloudStorage)
    }

    async fn nics(&self) -> CloudResult<Vec<Arc<dyn CloudHostNic>>> {
        fetch_as!(self, "nics", CloudHostNic)
    }

    async fn vms(&self) -> CloudResult<Vec<Arc<dyn CloudVm>>> {
        fetch_as!(self, "vms", CloudVm)
    }
}

impl CloudHostNic for InventoryNode {
    fn mac(&self) -> String {
        self.attr_str("mac")
    }

    fn ip_addr(&self) -> String {
        self.attr_str("ip_addr")
    }

    fn wire_id(&self) -> Option<String> {
        self.attr_opt("wire_id")
    }
}

#[async_trait]
impl CloudVm for InventoryNode {
    fn vcpu_count(&self) -> u32 {
        self.attr_u32("vcpu_count")
    }

    fn vmem_size_mb(&self) -> u64 {
        self.attr_u64("vmem_size_mb")
    }

    fn os_type(&self) -> String {
        self.attr_str("os_type")
    }

    async fn nics(&self) -> CloudResult<Vec<Arc<dyn CloudVmNic>>> {
        fetch_as!(self, "nics", CloudVmNic)
    }

    async fn disks(&self) -> CloudResult<Vec<Arc<dyn CloudDisk>>> {
        fetch_as!(self, "disks", CloudDisk)
    }

    async fn eip(&self) -> CloudResult<Option<Arc<dyn CloudEip>>> {
        Ok(self.single("eip").await?.map(|n| n as Arc<dyn CloudEip>))
    }
}

impl CloudVmNic for InventoryNode {
    fn mac(&self) -> String {
        self.attr_str("mac")
    }

    fn ip_addr(&self) -> String {
        self.attr_str("ip_addr")
    }

    fn network_id(&self) -> String {
        self.attr_str("network_id")
    }
}

impl CloudSnapshot for InventoryNode {
    fn disk_id(&self) -> Option<String> {
        self.attr_opt("disk_id")
    }

    fn size_mb(&self) -> u64 {
        self.attr_u64("size_mb")
    }
}

impl CloudSku for InventoryNode {
    fn cpu_core_count(&self) -> u32 {
        self.attr_u32("cpu_core_count")
    }

    fn memory_size_mb(&self) -> u64 {
        self.attr_u64("memory_size_mb")
    }

    fn instance_type_family(&self) -> String {
        self.attr_str("instance_type_family")
    }
}

impl CloudLbAcl for InventoryNode {
    fn entries(&self) -> Vec<String> {
        self.attr_list("entries")
    }
}

impl CloudLbCertificate for InventoryNode {
    fn fingerprint(&self) -> String {
        self.attr_str("fingerprint")
    }

    fn common_name(&self) -> String {
        self.attr_str("common_name")
    }

    fn not_after(&self) -> Option<DateTime<Utc>> {
        self.attr_opt("not_after")
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|d| d.with_timezone(&Utc))
    }
}

#[async_trait]
impl CloudLoadbalancer for InventoryNode {
    fn address(&self) -> String {
        self.attr_str("address")
    }

    fn address_type(&self) -> String {
        self.attr_str("address_type")
    }

    async fn backend_groups(&self) -> CloudResult<Vec<Arc<dyn CloudLbBackendGroup>>> {
        fetch_as!(self, "backend_groups", CloudLbBackendGroup)
    }

    async fn listeners(&self) -> CloudResult<Vec<Arc<dyn CloudLbListener>>> {
        fetch_as!(self, "listeners", CloudLbListener)
    }
}

#[async_trait]
impl CloudLbBackendGroup for InventoryNode {
    fn group_type(&self) -> String {
        self.attr_str("group_type")
    }

    async fn backends(&self) -> CloudResult<Vec<Arc<dyn CloudLbBackend>>> {
        fetch_as!(self, "backends", CloudLbBackend)
    }
}

impl CloudLbBackend for InventoryNode {
    fn backend_id(&self) -> Option<String> {
        self.attr_opt("backend_id")
    }

    fn port(&self) -> u16 {
        self.attr_u16("port")
    }

    fn weight(&self) -> u32 {
        self.attr_u32("weight")
    }
}

#[async_trait]
impl CloudLbListener for InventoryNode {
    fn protocol(&self) -> String {
        self.attr_str("protocol")
    }

    fn port(&self) -> u16 {
        self.attr_u16("port")
    }

    fn backend_group_id(&self) -> Option<String> {
        self.attr_opt("backend_group_id")
    }

    fn acl_id(&self) -> Option<String> {
        self.attr_opt("acl_id")
    }

    fn certificate_id(&self) -> Option<String> {
        self.attr_opt("certificate_id")
    }

    async fn rules(&self) -> CloudResult<Vec<Arc<dyn CloudLbListenerRule>>> {
        fetch_as!(self, "rules", CloudLbListenerRule)
    }
}

impl CloudLbListenerRule for InventoryNode {
    fn domain(&self) -> String {
        self.attr_str("domain")
    }

    fn path(&self) -> String {
        self.attr_str("path")
    }

    fn backend_group_id(&self) -> Option<String> {
        self.attr_opt("backend_group_id")
    }
}

/// Root of an inventory document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inventory {
    /// On-premise providers have one implicit region and sync hosts and
    /// storages directly under it.
    #[serde(default)]
    pub on_premise: bool,
    #[serde(default)]
    pub capabilities: Capabilities,
    #[serde(default)]
    pub regions: Vec<Arc<InventoryNode>>,
    #[serde(default)]
    pub on_premise_region: Option<Arc<InventoryNode>>,
    /// `regions` makes every region lookup fail.
    #[serde(default)]
    pub fail: BTreeSet<String>,
    #[serde(default)]
    pub delay_ms: u64,
}

impl Inventory {
    pub fn from_yaml_str(yaml: &str) -> CloudResult<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    async fn check_regions(&self) -> CloudResult<()> {
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        if self.fail.contains("regions") {
            return Err(CloudError::Unreachable("region listing unavailable".to_string()));
        }
        Ok(())
    }
}

/// [`CloudProvider`] serving an [`Inventory`].
pub struct InventoryProvider {
    inventory: RwLock<Arc<Inventory>>,
}

impl InventoryProvider {
    pub fn new(inventory: Inventory) -> Self {
        Self {
            inventory: RwLock::new(Arc::new(inventory)),
        }
    }

    pub fn from_yaml_str(yaml: &str) -> CloudResult<Self> {
        Ok(Self::new(Inventory::from_yaml_str(yaml)?))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> CloudResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CloudError::Inventory(format!("failed to read '{}': {}", path.display(), e))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Swaps the served inventory. Fetches already in progress finish
    /// against the old one.
    pub fn replace(&self, inventory: Inventory) {
        *self.inventory.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(inventory);
    }

    pub fn replace_yaml(&self, yaml: &str) -> CloudResult<()> {
        self.replace(Inventory::from_yaml_str(yaml)?);
        Ok(())
    }

    fn snapshot(&self) -> Arc<Inventory> {
        Arc::clone(&self.inventory.read().unwrap_or_else(PoisonError::into_inner))
    }
}

#[async_trait]
impl CloudProvider for InventoryProvider {
    fn capabilities(&self) -> Capabilities {
        self.snapshot().capabilities
    }

    fn is_public_cloud(&self) -> bool {
        !self.snapshot().on_premise
    }

    fn is_on_premise(&self) -> bool {
        self.snapshot().on_premise
    }

    async fn regions(&self) -> CloudResult<Vec<Arc<dyn CloudRegion>>> {
        let inventory = self.snapshot();
        inventory.check_regions().await?;
        Ok(inventory
            .regions
            .iter()
            .map(|n| Arc::clone(n) as Arc<dyn CloudRegion>)
            .collect())
    }

    async fn region_by_id(&self, global_id: &str) -> CloudResult<Arc<dyn CloudRegion>> {
        let inventory = self.snapshot();
        inventory.check_regions().await?;
        inventory
            .regions
            .iter()
            .find(|n| n.id == global_id)
            .map(|n| Arc::clone(n) as Arc<dyn CloudRegion>)
            .ok_or_else(|| CloudError::NotFound {
                kind: "region".to_string(),
                id: global_id.to_string(),
            })
    }

    async fn on_premise_region(&self) -> CloudResult<Arc<dyn CloudRegion>> {
        let inventory = self.snapshot();
        inventory.check_regions().await?;
        inventory
            .on_premise_region
            .as_ref()
            .map(|n| Arc::clone(n) as Arc<dyn CloudRegion>)
            .ok_or_else(|| CloudError::NotSupported("provider has no on-premise region".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
regions:
  - id: region-1
    name: Region One
    children:
      vpcs:
        - id: vpc-1
          attrs: { cidr_block: 10.0.0.0/16, is_default: true }
          children:
            wires:
              - id: wire-1
                attrs: { bandwidth: 1000, zone_id: zone-a }
      zones:
        - id: zone-a
      loadbalancers:
        - id: lb-1
          fail: [listeners]
"#;

    #[tokio::test]
    async fn test_parse_and_walk() {
        let provider = InventoryProvider::from_yaml_str(YAML).unwrap();
        assert!(provider.is_public_cloud());
        assert_eq!(provider.capabilities(), Capabilities::default());

        let region = provider.region_by_id("region-1").await.unwrap();
        assert_eq!(region.name(), "Region One");

        let vpcs = region.vpcs().await.unwrap();
        assert_eq!(vpcs.len(), 1);
        assert_eq!(vpcs[0].cidr_block(), "10.0.0.0/16");
        assert!(vpcs[0].is_default());
        assert_eq!(vpcs[0].status(), "available");

        let wires = vpcs[0].wires().await.unwrap();
        assert_eq!(wires[0].global_id(), "wire-1");
        assert_eq!(wires[0].name(), "wire-1");
        assert_eq!(wires[0].bandwidth(), 1000);
        assert_eq!(wires[0].zone_id().as_deref(), Some("zone-a"));
        assert!(wires[0].networks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let provider = InventoryProvider::from_yaml_str(YAML).unwrap();
        let region = provider.region_by_id("region-1").await.unwrap();
        let lbs = region.loadbalancers().await.unwrap();

        match lbs[0].listeners().await {
            Err(err) => assert!(err.is_retryable()),
            Ok(_) => panic!("listeners should fail"),
        }
        assert!(lbs[0].backend_groups().await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_region_and_replace() {
        let provider = InventoryProvider::from_yaml_str(YAML).unwrap();
        assert!(matches!(
            provider.region_by_id("nope").await,
            Err(CloudError::NotFound { .. })
        ));

        provider.replace_yaml("fail: [regions]").unwrap();
        assert!(provider.regions().await.is_err());

        provider.replace(Inventory {
            on_premise: true,
            on_premise_region: Some(Arc::new(InventoryNode::new("local"))),
            ..Default::default()
        });
        assert!(provider.is_on_premise());
        let region = provider.on_premise_region().await.unwrap();
        assert_eq!(region.global_id(), "local");
    }

    #[tokio::test]
    async fn test_builder_and_single_children() {
        let storage = InventoryNode::new("st-1")
            .with_attr("capacity_mb", 2048)
            .with_child("storagecache", InventoryNode::new("sc-1").with_attr("path", "/cache"));
        assert_eq!(storage.capacity_mb(), 2048);
        let cache = storage.storagecache().unwrap();
        assert_eq!(cache.global_id(), "sc-1");
        assert_eq!(cache.path(), "/cache");

        let vm = InventoryNode::new("vm-1").with_child("eip", InventoryNode::new("eip-1"));
        let eip = CloudVm::eip(&vm).await.unwrap().unwrap();
        assert_eq!(eip.global_id(), "eip-1");
        assert!(CloudVm::eip(&InventoryNode::new("vm-2")).await.unwrap().is_none());
    }
}
