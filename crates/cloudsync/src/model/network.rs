//! Region, zone and network records.

use serde::{Deserialize, Serialize};

use super::ResourceBase;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cloudregion {
    #[serde(flatten)]
    pub base: ResourceBase,
    /// Brand of the provider serving this region.
    #[serde(default)]
    pub provider: String,
}

impl Cloudregion {
    /// Whether this region mirrors a remote region. The local default
    /// region used by on-premise providers has no external id.
    pub fn is_managed(&self) -> bool {
        !self.base.external_id.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    #[serde(flatten)]
    pub base: ResourceBase,
    pub cloudregion_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vpc {
    #[serde(flatten)]
    pub base: ResourceBase,
    pub cloudregion_id: String,
    #[serde(default)]
    pub cidr_block: String,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Wire {
    #[serde(flatten)]
    pub base: ResourceBase,
    pub vpc_id: String,
    #[serde(default)]
    pub zone_id: String,
    /// Mbps.
    #[serde(default)]
    pub bandwidth: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Network {
    #[serde(flatten)]
    pub base: ResourceBase,
    pub wire_id: String,
    #[serde(default)]
    pub guest_ip_start: String,
    #[serde(default)]
    pub guest_ip_end: String,
    #[serde(default)]
    pub guest_ip_mask: u8,
    #[serde(default)]
    pub guest_gateway: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Secgroup {
    #[serde(flatten)]
    pub base: ResourceBase,
    pub vpc_id: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteTable {
    #[serde(flatten)]
    pub base: ResourceBase,
    pub vpc_id: String,
    #[serde(default)]
    pub routes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Elasticip {
    #[serde(flatten)]
    pub base: ResourceBase,
    pub cloudregion_id: String,
    #[serde(default)]
    pub ip_addr: String,
    #[serde(default)]
    pub bandwidth: u32,
    /// Local id of the guest this address is bound to.
    #[serde(default)]
    pub associate_id: String,
}

impl_record!(Cloudregion, "cloudregions");
impl_record!(Zone, "zones");
impl_record!(Vpc, "vpcs");
impl_record!(Wire, "wires");
impl_record!(Network, "networks");
impl_record!(Secgroup, "secgroups");
impl_record!(RouteTable, "route_tables");
impl_record!(Elasticip, "elasticips");

impl_scoped!(region: Zone, Vpc, Elasticip);
impl_scoped!(zone: Wire);
