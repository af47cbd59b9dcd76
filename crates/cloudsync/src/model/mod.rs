//! Local record types.
//!
//! Every record embeds a [`ResourceBase`] holding the columns shared by all
//! kinds and adds its own typed fields. Records round-trip through JSON, so
//! the base is flattened into the same object as the kind fields.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

macro_rules! impl_record {
    ($ty:ty, $kind:literal) => {
        impl $crate::model::Record for $ty {
            const KIND: &'static str = $kind;

            fn base(&self) -> &$crate::model::ResourceBase {
                &self.base
            }

            fn base_mut(&mut self) -> &mut $crate::model::ResourceBase {
                &mut self.base
            }
        }
    };
}

macro_rules! impl_scoped {
    (region: $($ty:ty),+ $(,)?) => {
        $(impl $crate::model::RegionScoped for $ty {
            fn cloudregion_id(&self) -> &str {
                &self.cloudregion_id
            }
        })+
    };
    (zone: $($ty:ty),+ $(,)?) => {
        $(impl $crate::model::ZoneScoped for $ty {
            fn zone_id(&self) -> &str {
                &self.zone_id
            }
        })+
    };
}

pub mod compute;
pub mod loadbalancer;
pub mod network;

pub use compute::{
    Cachedimage, Disk, Guest, Guestdisk, Guestnetwork, Host, Hoststorage, Netinterface, ServerSku,
    Snapshot, Storage, Storagecache,
};
pub use loadbalancer::{
    Loadbalancer, LoadbalancerAcl, LoadbalancerBackend, LoadbalancerBackendGroup,
    LoadbalancerCertificate, LoadbalancerListener, LoadbalancerListenerRule,
};
pub use network::{Cloudregion, Elasticip, Network, RouteTable, Secgroup, Vpc, Wire, Zone};

/// Status given to a record whose remote counterpart vanished but which
/// could not be deleted.
pub const STATUS_UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceBase {
    pub id: String,
    pub name: String,
    /// Remote global id. Empty for records that were never synced.
    #[serde(default)]
    pub external_id: String,
    #[serde(default)]
    pub status: String,
    /// Provider that owns this record.
    #[serde(default)]
    pub manager_id: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub domain_id: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub disable_delete: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResourceBase {
    /// A fresh base with a new id and both timestamps set to now.
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            created_at: now,
            updated_at: now,
            ..Default::default()
        }
    }
}

/// A persisted record kind.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Plural keyword. Doubles as the store kind and the result key.
    const KIND: &'static str;

    fn base(&self) -> &ResourceBase;
    fn base_mut(&mut self) -> &mut ResourceBase;

    fn id(&self) -> &str {
        &self.base().id
    }

    fn name(&self) -> &str {
        &self.base().name
    }
}

/// A record that can be paired with a remote resource.
pub trait ExternalizedResource {
    fn external_id(&self) -> &str;
}

impl<R: Record> ExternalizedResource for R {
    fn external_id(&self) -> &str {
        &self.base().external_id
    }
}

/// A record owned by a provider.
pub trait ManagerScoped {
    fn manager_id(&self) -> &str;
}

impl<R: Record> ManagerScoped for R {
    fn manager_id(&self) -> &str {
        &self.base().manager_id
    }
}

/// A record that belongs to a region.
pub trait RegionScoped {
    fn cloudregion_id(&self) -> &str;
}

/// A record that belongs to a zone.
pub trait ZoneScoped {
    fn zone_id(&self) -> &str;
}
