use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cloud::{CloudError, CloudResource, CloudResult};
use crate::lock::LockService;
use crate::model::{Record, ResourceBase};
use crate::store::{RecordStore, StoreResult};
use crate::sync::SyncRange;

/// Local identity of a provider account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub domain_id: String,
    /// Project that synced records land in by default.
    #[serde(default)]
    pub project_id: String,
    /// Remote project id to local project id.
    #[serde(default)]
    pub project_mapping: BTreeMap<String, String>,
}

impl ProviderInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Local project for a resource in remote project `remote`.
    pub fn resolve_project(&self, remote: Option<&str>) -> String {
        remote
            .and_then(|p| self.project_mapping.get(p))
            .cloned()
            .unwrap_or_else(|| self.project_id.clone())
    }
}

/// Everything a reconciler needs besides its parent and remote items.
#[derive(Clone)]
pub struct SyncContext {
    pub store: RecordStore,
    pub locks: Arc<dyn LockService>,
    pub provider: Arc<ProviderInfo>,
    pub range: Arc<SyncRange>,
    pub fetch_timeout: Duration,
}

impl SyncContext {
    pub fn new(store: RecordStore, locks: Arc<dyn LockService>, provider: Arc<ProviderInfo>) -> Self {
        Self {
            store,
            locks,
            provider,
            range: Arc::new(SyncRange::default()),
            fetch_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_range(mut self, range: SyncRange) -> Self {
        self.range = Arc::new(range);
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Awaits a remote call, failing it once the fetch deadline passes.
    pub async fn fetch<T, F>(&self, what: &str, call: F) -> CloudResult<T>
    where
        F: Future<Output = CloudResult<T>>,
    {
        match tokio::time::timeout(self.fetch_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(CloudError::Timeout {
                what: what.to_string(),
                after_ms: u64::try_from(self.fetch_timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    /// Base for a new record mirroring `remote`.
    pub fn new_base<R: CloudResource + ?Sized>(&self, remote: &R) -> ResourceBase {
        let mut base = ResourceBase::new(remote.name());
        base.external_id = remote.global_id();
        base.manager_id = self.provider.id.clone();
        self.apply_metadata(&mut base, remote);
        base
    }

    /// Copies status, tags and ownership from `remote`.
    pub fn apply_metadata<R: CloudResource + ?Sized>(&self, base: &mut ResourceBase, remote: &R) {
        base.status = remote.status();
        base.tags = remote.tags();
        base.project_id = self.provider.resolve_project(remote.project_id().as_deref());
        base.domain_id = self.provider.domain_id.clone();
    }

    /// The record of this provider mirroring remote `external_id`.
    pub async fn find_external<R: Record>(&self, external_id: &str) -> StoreResult<Option<R>> {
        self.store.find_external(&self.provider.id, external_id).await
    }
}
