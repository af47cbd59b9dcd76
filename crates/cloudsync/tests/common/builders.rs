//! Builders for assembling inventories without YAML.

#![allow(dead_code)]

use std::sync::Arc;

use cloudsync::cloud::{Capabilities, Inventory, InventoryNode};

/// Builder for `Inventory` instances.
pub struct InventoryBuilder {
    on_premise: bool,
    capabilities: Capabilities,
    regions: Vec<InventoryNode>,
    on_premise_region: Option<InventoryNode>,
}

impl InventoryBuilder {
    pub fn new() -> Self {
        Self {
            on_premise: false,
            capabilities: Capabilities::default(),
            regions: Vec::new(),
            on_premise_region: None,
        }
    }

    pub fn region(mut self, region: InventoryNode) -> Self {
        self.regions.push(region);
        self
    }

    /// Makes the provider on-premise with `region` as its only region.
    pub fn on_premise(mut self, region: InventoryNode) -> Self {
        self.on_premise = true;
        self.on_premise_region = Some(region);
        self
    }

    pub fn without_loadbalancers(mut self) -> Self {
        self.capabilities.loadbalancer = false;
        self
    }

    pub fn build(self) -> Inventory {
        Inventory {
            on_premise: self.on_premise,
            capabilities: self.capabilities,
            regions: self.regions.into_iter().map(Arc::new).collect(),
            on_premise_region: self.on_premise_region.map(Arc::new),
            ..Default::default()
        }
    }
}

impl Default for InventoryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn wire(id: &str, networks: &[&str]) -> InventoryNode {
    networks.iter().fold(
        InventoryNode::new(id).with_attr("bandwidth", 1000),
        |wire, net| {
            wire.with_child(
                "networks",
                InventoryNode::new(*net)
                    .with_attr("ip_start", "10.1.0.2")
                    .with_attr("ip_end", "10.1.0.254")
                    .with_attr("ip_mask", 24),
            )
        },
    )
}

pub fn vpc(id: &str, wires: Vec<InventoryNode>) -> InventoryNode {
    wires
        .into_iter()
        .fold(InventoryNode::new(id).with_attr("cidr_block", "10.1.0.0/16"), |vpc, w| {
            vpc.with_child("wires", w)
        })
}

pub fn host(id: &str, vms: &[&str]) -> InventoryNode {
    vms.iter().fold(
        InventoryNode::new(id)
            .with_attr("cpu_count", 16)
            .with_attr("mem_size_mb", 65536),
        |host, vm| host.with_child("vms", InventoryNode::new(*vm).with_attr("vcpu_count", 2)),
    )
}

/// A region with one zone holding `hosts`.
pub fn region_with_hosts(id: &str, hosts: Vec<InventoryNode>) -> InventoryNode {
    let zone = hosts
        .into_iter()
        .fold(InventoryNode::new(format!("{}-zone", id)), |zone, h| {
            zone.with_child("hosts", h)
        });
    InventoryNode::new(id).with_child("zones", zone)
}
