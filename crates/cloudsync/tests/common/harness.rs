//! Test harness for isolated sync runs.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use cloudsync::cloud::{Inventory, InventoryProvider};
use cloudsync::lock::KeyedLockManager;
use cloudsync::model::Record;
use cloudsync::reconcile::{ProviderInfo, SyncContext};
use cloudsync::store::{RecordStore, Scope};
use cloudsync::{Database, SyncConfig, SyncRange, SyncService, SyncUnit};

pub const PROVIDER_ID: &str = "provider-1";

/// A sync service over a temp-dir database and one inventory provider.
pub struct TestHarness {
    temp_dir: TempDir,
    pub db_path: PathBuf,
    pub service: SyncService,
    pub provider: Arc<InventoryProvider>,
}

impl TestHarness {
    pub fn new(inventory: Inventory) -> Self {
        Self::with_config(inventory, Self::test_config())
    }

    pub fn from_yaml(yaml: &str) -> Self {
        Self::new(Inventory::from_yaml_str(yaml).expect("Failed to parse inventory"))
    }

    /// Loads `tests/fixtures/<name>`.
    pub fn from_fixture(name: &str) -> Self {
        Self::from_yaml(&fixture(name))
    }

    pub fn with_config(inventory: Inventory, config: SyncConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("data").join("cloudsync.db");
        let db = Database::open(&db_path).expect("Failed to open database");

        let service = SyncService::new(config, db);
        let provider = Arc::new(InventoryProvider::new(inventory));
        service.register_provider(ProviderInfo::new(PROVIDER_ID, "test-cloud"), provider.clone());

        Self {
            temp_dir,
            db_path,
            service,
            provider,
        }
    }

    /// Fast retries so failure tests do not sleep for seconds.
    pub fn test_config() -> SyncConfig {
        SyncConfig {
            retry_base_delay_ms: 1,
            max_concurrent_syncs: 4,
            ..Default::default()
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn store(&self) -> &RecordStore {
        self.service.store()
    }

    pub fn replace_yaml(&self, yaml: &str) {
        self.provider
            .replace_yaml(yaml)
            .expect("Failed to parse inventory");
    }

    /// Reconciles regions and returns the unit of the first one.
    pub async fn attach(&self) -> SyncUnit {
        let mut units = self
            .service
            .sync_provider_regions(PROVIDER_ID)
            .await
            .expect("Failed to sync regions");
        assert!(!units.is_empty(), "inventory has no regions");
        units.remove(0)
    }

    pub async fn sync(&self, unit: &SyncUnit) -> SyncUnit {
        self.sync_with(unit, SyncRange::default()).await
    }

    pub async fn sync_with(&self, unit: &SyncUnit, range: SyncRange) -> SyncUnit {
        self.service
            .sync_now(&unit.id, range)
            .await
            .expect("Sync failed")
    }

    /// A context for driving reconcilers directly.
    pub fn context(&self, range: SyncRange, fetch_timeout: Duration) -> SyncContext {
        SyncContext::new(
            self.store().clone(),
            Arc::new(KeyedLockManager::new()),
            Arc::new(ProviderInfo::new(PROVIDER_ID, "test-cloud")),
        )
        .with_range(range)
        .with_fetch_timeout(fetch_timeout)
    }

    pub async fn all<R: Record>(&self) -> Vec<R> {
        self.store()
            .query::<R>(&Scope::all())
            .await
            .expect("Failed to query store")
    }

    pub async fn by_external<R: Record>(&self, external_id: &str) -> R {
        self.store()
            .find_external::<R>(PROVIDER_ID, external_id)
            .await
            .expect("Failed to query store")
            .unwrap_or_else(|| panic!("no {} for '{}'", R::KIND, external_id))
    }
}

pub fn fixture(name: &str) -> String {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read fixture {}: {}", path.display(), e))
}
