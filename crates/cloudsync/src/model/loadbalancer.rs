//! Load balancer records.
//!
//! Backends and listener rules carry their load balancer's id as well as
//! their direct parent's, so deleting a load balancer can clear all of its
//! descendants in one pass per kind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ResourceBase;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadbalancerAcl {
    #[serde(flatten)]
    pub base: ResourceBase,
    pub cloudregion_id: String,
    #[serde(default)]
    pub entries: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadbalancerCertificate {
    #[serde(flatten)]
    pub base: ResourceBase,
    pub cloudregion_id: String,
    #[serde(default)]
    pub fingerprint: String,
    #[serde(default)]
    pub common_name: String,
    #[serde(default)]
    pub not_after: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Loadbalancer {
    #[serde(flatten)]
    pub base: ResourceBase,
    pub cloudregion_id: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub address_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadbalancerBackendGroup {
    #[serde(flatten)]
    pub base: ResourceBase,
    pub loadbalancer_id: String,
    #[serde(default)]
    pub group_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadbalancerBackend {
    #[serde(flatten)]
    pub base: ResourceBase,
    pub loadbalancer_id: String,
    pub backend_group_id: String,
    /// Local guest id, empty when the backend is not a known guest.
    #[serde(default)]
    pub backend_id: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub weight: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadbalancerListener {
    #[serde(flatten)]
    pub base: ResourceBase,
    pub loadbalancer_id: String,
    #[serde(default)]
    pub listener_type: String,
    #[serde(default)]
    pub listener_port: u16,
    #[serde(default)]
    pub backend_group_id: String,
    #[serde(default)]
    pub acl_id: String,
    #[serde(default)]
    pub certificate_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadbalancerListenerRule {
    #[serde(flatten)]
    pub base: ResourceBase,
    pub loadbalancer_id: String,
    pub listener_id: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub backend_group_id: String,
}

impl_record!(LoadbalancerAcl, "loadbalanceracls");
impl_record!(LoadbalancerCertificate, "loadbalancercertificates");
impl_record!(Loadbalancer, "loadbalancers");
impl_record!(LoadbalancerBackendGroup, "loadbalancerbackendgroups");
impl_record!(LoadbalancerBackend, "loadbalancerbackends");
impl_record!(LoadbalancerListener, "loadbalancerlisteners");
impl_record!(LoadbalancerListenerRule, "loadbalancerlistenerrules");

impl_scoped!(region: LoadbalancerAcl, LoadbalancerCertificate, Loadbalancer);
