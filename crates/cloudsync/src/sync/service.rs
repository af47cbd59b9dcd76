//! The sync service: provider registry, region attachment and the sync
//! unit lifecycle around each cascade.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use tracing::{error, info, info_span, warn, Instrument};

use super::cascade::{sync_regions, Cascade};
use super::error::{Result, SyncError};
use super::range::SyncRange;
use super::unit::{SyncStatus, SyncUnit};
use super::units::SyncUnitManager;
use crate::cloud::{CloudError, CloudProvider, CloudRegion, CloudResult};
use crate::config::SyncConfig;
use crate::db::Database;
use crate::error::ConfigError;
use crate::events::{SyncEvent, SyncEventBroadcaster, SyncPhase};
use crate::lock::{KeyedLockManager, LockService};
use crate::model::{Cloudregion, Record};
use crate::reconcile::{ProviderInfo, SyncContext};
use crate::result::SyncResultSet;
use crate::scheduler::{Submission, SyncTaskRunner};
use crate::store::{RecordStore, SqliteStore};

/// A provider account together with its driver.
#[derive(Clone)]
pub struct RegisteredProvider {
    pub info: Arc<ProviderInfo>,
    pub driver: Arc<dyn CloudProvider>,
}

/// Providers known to the service, by local provider id.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Arc<RwLock<HashMap<String, RegisteredProvider>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, info: ProviderInfo, driver: Arc<dyn CloudProvider>) {
        let provider = RegisteredProvider {
            info: Arc::new(info),
            driver,
        };
        self.providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(provider.info.id.clone(), provider);
    }

    pub fn unregister(&self, provider_id: &str) -> bool {
        self.providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(provider_id)
            .is_some()
    }

    pub fn get(&self, provider_id: &str) -> Result<RegisteredProvider> {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(provider_id)
            .cloned()
            .ok_or_else(|| SyncError::ProviderNotRegistered(provider_id.to_string()))
    }
}

/// Everything needed to run syncs, built once and shared by handle.
#[derive(Clone)]
pub struct SyncService {
    config: Arc<SyncConfig>,
    store: RecordStore,
    units: SyncUnitManager,
    locks: Arc<dyn LockService>,
    runner: SyncTaskRunner,
    providers: ProviderRegistry,
    events: SyncEventBroadcaster,
}

impl SyncService {
    pub fn new(config: SyncConfig, db: Database) -> Self {
        let runner = SyncTaskRunner::new(config.max_concurrent_syncs);
        Self {
            config: Arc::new(config),
            store: RecordStore::new(Arc::new(SqliteStore::new(db.clone()))),
            units: SyncUnitManager::new(db),
            locks: Arc::new(KeyedLockManager::new()),
            runner,
            providers: ProviderRegistry::new(),
            events: SyncEventBroadcaster::default(),
        }
    }

    /// Opens the database at the configured path (or the default one) and
    /// builds the service on it.
    pub fn open(config: SyncConfig) -> crate::Result<Self> {
        let path = config
            .resolved_database_path()
            .ok_or_else(|| ConfigError::Validation {
                message: "database_path is unset and no home directory was found".to_string(),
            })?;
        let db = Database::open(&path)?;
        Ok(Self::new(config, db))
    }

    /// Replaces the in-process lock manager, e.g. with a distributed one.
    pub fn with_lock_service(mut self, locks: Arc<dyn LockService>) -> Self {
        self.locks = locks;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn units(&self) -> &SyncUnitManager {
        &self.units
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    pub fn runner(&self) -> &SyncTaskRunner {
        &self.runner
    }

    pub fn events(&self) -> &SyncEventBroadcaster {
        &self.events
    }

    pub fn register_provider(&self, info: ProviderInfo, driver: Arc<dyn CloudProvider>) {
        self.providers.register(info, driver);
    }

    fn context(&self, provider: &RegisteredProvider, range: SyncRange) -> SyncContext {
        SyncContext::new(self.store.clone(), Arc::clone(&self.locks), Arc::clone(&provider.info))
            .with_range(range)
            .with_fetch_timeout(self.config.fetch_timeout())
    }

    /// Runs `call` under the fetch deadline, retrying transient failures
    /// with doubling delays.
    async fn fetch_with_retry<T, F, Fut>(&self, ctx: &SyncContext, what: &str, mut call: F) -> CloudResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CloudResult<T>>,
    {
        let retries = self.config.fetch_retries;
        let mut last_error = None;

        for attempt in 0..=retries {
            if attempt > 0 {
                let delay = self.config.retry_delay(attempt);
                info!(
                    "Retrying fetch {} (attempt {}/{}) after {}ms...",
                    what,
                    attempt + 1,
                    retries + 1,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            match ctx.fetch(what, call()).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if e.is_retryable() && attempt < retries {
                        warn!("Fetch {} failed with retryable error: {}", what, e);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            CloudError::Request(format!("fetch {} failed after all retries", what))
        }))
    }

    /// Reconciles the region records of `provider_id` and keeps one sync
    /// unit per present region. Units of regions that are gone are
    /// detached.
    pub async fn sync_provider_regions(&self, provider_id: &str) -> Result<Vec<SyncUnit>> {
        let provider = self.providers.get(provider_id)?;
        let ctx = self.context(&provider, SyncRange::default());
        let driver = Arc::clone(&provider.driver);

        let remote: Vec<Arc<dyn CloudRegion>> = if driver.is_on_premise() {
            vec![
                self.fetch_with_retry(&ctx, "on-premise region", || driver.on_premise_region())
                    .await?,
            ]
        } else {
            self.fetch_with_retry(&ctx, "regions", || driver.regions())
                .await?
        };

        let reconciled = sync_regions(&ctx, remote).await;
        if let Some(err) = &reconciled.result.error {
            return Err(SyncError::RegionSync(err.clone()));
        }

        let mut units = Vec::with_capacity(reconciled.pairs.len());
        let mut present = BTreeSet::new();
        for pair in &reconciled.pairs {
            present.insert(pair.local.id().to_string());
            units.push(self.units.attach(provider_id, pair.local.id()).await?);
        }

        for unit in self.units.list_by_provider(provider_id).await? {
            if !present.contains(&unit.region_id) {
                self.units.detach(provider_id, &unit.region_id).await?;
            }
        }

        Ok(units)
    }

    /// Marks every unit of `provider_id` covered by `range` and submits a
    /// sync for each. Returns how many syncs were started.
    pub async fn sync_provider(&self, provider_id: &str, range: SyncRange) -> Result<usize> {
        let mut started = 0;
        for unit in self.units.list_by_provider(provider_id).await? {
            if !unit.enabled {
                continue;
            }
            let unit = self.units.mark_starting_sync(&unit.id, &range).await?;
            if unit.sync_status != SyncStatus::Queuing {
                continue;
            }
            match self.submit_sync_task(&unit.id, range.clone()).await {
                Ok(submission) => {
                    if submission.is_started() {
                        started += 1;
                    }
                }
                Err(e) => {
                    warn!(unit_id = %unit.id, error = %e, "failed to submit sync");
                    self.units.cancel_starting_sync(&unit.id).await?;
                }
            }
        }
        Ok(started)
    }

    /// Marks the unit queued and hands its sync to the runner, keyed by
    /// region. A submission for a key already in flight only marks.
    pub async fn submit_sync_task(&self, unit_id: &str, range: SyncRange) -> Result<Submission> {
        let unit = self.units.get(unit_id).await?;
        let region_external_id = match self.store.get::<Cloudregion>(&unit.region_id).await? {
            Some(region) => region.base().external_id.clone(),
            None => String::new(),
        };
        let unit = self.units.mark_queued(&unit.id).await?;
        self.events.send(SyncEvent::new(&unit.id, SyncPhase::Queued));

        let service = self.clone();
        let id = unit.id.clone();
        let key = unit.task_key(&region_external_id);
        let submission = self.runner.submit_owned(key.clone(), unit.id.clone(), async move {
            service.do_sync(&id, range).await;
        });

        if !submission.is_started() {
            info!(unit_id = %unit.id, "sync already running for this region");
            // the running task belongs to another unit sharing the key
            if self.runner.owner(&key).as_deref() != Some(unit.id.as_str()) {
                self.units.cancel_queued(&unit.id).await?;
            }
            self.events.send(SyncEvent::new(&unit.id, SyncPhase::Skipped));
        }
        Ok(submission)
    }

    /// Submits a sync and waits for it. If one was already running, returns
    /// without waiting for it.
    pub async fn sync_now(&self, unit_id: &str, range: SyncRange) -> Result<SyncUnit> {
        if let Submission::Started(handle) = self.submit_sync_task(unit_id, range).await? {
            handle.await.map_err(|e| SyncError::Task(e.to_string()))?;
        }
        self.units.get(unit_id).await
    }

    /// Submits every enabled unit that is due. Returns how many syncs were
    /// started.
    pub async fn auto_sync_sweep(&self) -> Result<usize> {
        let units = self.units.list_enabled().await?;
        Ok(self.sweep(units).await)
    }

    /// Submits the due units among `units`. A unit that fails is logged and
    /// skipped.
    async fn sweep(&self, units: Vec<SyncUnit>) -> usize {
        let now = Utc::now();
        let mut started = 0;

        for unit in units {
            let provider = match self.providers.get(&unit.provider_id) {
                Ok(provider) => provider,
                Err(_) => continue,
            };
            let on_premise = provider.driver.is_on_premise();
            if !unit.can_sync(self.config.stale_after(), now)
                || !unit.need_auto_sync(&self.config, on_premise, now)
            {
                continue;
            }

            if let Err(e) = self.units.mark_auto_sync(&unit.id).await {
                warn!(unit_id = %unit.id, error = %e, "failed to mark auto sync, skipping unit");
                continue;
            }
            match self.submit_sync_task(&unit.id, SyncRange::default()).await {
                Ok(submission) => {
                    if submission.is_started() {
                        started += 1;
                    }
                }
                Err(e) => warn!(unit_id = %unit.id, error = %e, "auto sync submission failed"),
            }
        }

        if started > 0 {
            info!("Auto sync started {} unit(s)", started);
        }
        started
    }

    /// Runs one sync of a unit. Never fails: whatever goes wrong is logged
    /// and the unit still returns to idle.
    async fn do_sync(&self, unit_id: &str, range: SyncRange) {
        let unit = match self.units.get(unit_id).await {
            Ok(unit) => unit,
            Err(e) => {
                error!(unit_id, error = %e, "cannot load sync unit");
                return;
            }
        };

        let span = info_span!(
            "sync_unit",
            unit_id = %unit.id,
            region = %unit.region_id,
            provider = %unit.provider_id
        );
        self.run_unit(unit, range).instrument(span).await;
    }

    async fn run_unit(&self, unit: SyncUnit, mut range: SyncRange) {
        if !range.deep_sync && unit.should_deep_sync(&self.config, Utc::now()) {
            info!("Promoting sync to deep sync");
            range.deep_sync = true;
        }
        let deep_sync = range.deep_sync;

        if let Err(e) = self.units.mark_syncing(&unit.id).await {
            error!(error = %e, "cannot start sync");
            if let Err(e) = self.units.cancel_starting_sync(&unit.id).await {
                warn!(error = %e, "failed to reset sync status");
            }
            return;
        }
        self.events.send(SyncEvent::new(&unit.id, SyncPhase::Started));

        let results = match self.sync_region(&unit, range).await {
            Ok(results) => results,
            Err(e) => {
                error!(error = %e, "sync aborted");
                SyncResultSet::new()
            }
        };

        match self
            .units
            .mark_end_sync(&unit.id, results.clone(), deep_sync)
            .await
        {
            Ok(done) => {
                if let Some(cost) = done.last_sync_cost() {
                    info!("Sync finished in {}s", cost.as_secs());
                }
            }
            Err(e) => error!(error = %e, "failed to record sync end"),
        }
        self.events.send(SyncEvent::finished(&unit.id, results));
    }

    async fn sync_region(&self, unit: &SyncUnit, range: SyncRange) -> Result<SyncResultSet> {
        let provider = self.providers.get(&unit.provider_id)?;
        let region = self
            .store
            .get::<Cloudregion>(&unit.region_id)
            .await?
            .ok_or_else(|| SyncError::RegionNotFound(unit.region_id.clone()))?;

        let ctx = self.context(&provider, range);
        let driver = Arc::clone(&provider.driver);
        let cascade = Cascade::new(&ctx, driver.as_ref());

        if driver.is_on_premise() {
            let remote = self
                .fetch_with_retry(&ctx, "on-premise region", || driver.on_premise_region())
                .await?;
            Ok(cascade.sync_on_premise(&region, remote.as_ref()).await)
        } else {
            let external_id = region.base().external_id.clone();
            let remote = self
                .fetch_with_retry(&ctx, "region", || driver.region_by_id(&external_id))
                .await?;
            Ok(cascade.sync_public(&region, remote.as_ref()).await)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cloud::{Inventory, InventoryNode, InventoryProvider};

    fn config() -> SyncConfig {
        SyncConfig {
            retry_base_delay_ms: 1,
            ..Default::default()
        }
    }

    fn service_with(inventory: Inventory) -> (SyncService, Arc<InventoryProvider>) {
        let service = SyncService::new(config(), Database::open_in_memory().unwrap());
        let provider = Arc::new(InventoryProvider::new(inventory));
        service.register_provider(ProviderInfo::new("p1", "acme"), provider.clone());
        (service, provider)
    }

    fn regions(ids: &[&str]) -> Inventory {
        Inventory {
            regions: ids
                .iter()
                .map(|id| {
                    Arc::new(
                        InventoryNode::new(*id).with_child("zones", InventoryNode::new(format!("{}-a", id))),
                    )
                })
                .collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_region_attach_and_detach() {
        let (service, provider) = service_with(regions(&["r1", "r2"]));

        let units = service.sync_provider_regions("p1").await.unwrap();
        assert_eq!(units.len(), 2);

        provider.replace(regions(&["r1"]));
        let units = service.sync_provider_regions("p1").await.unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(service.units().list_by_provider("p1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_provider() {
        let (service, _) = service_with(regions(&[]));
        let err = service.sync_provider_regions("nope").await.unwrap_err();
        assert!(matches!(err, SyncError::ProviderNotRegistered(_)));
    }

    #[tokio::test]
    async fn test_sync_now_runs_cascade_and_returns_to_idle() {
        let (service, _) = service_with(regions(&["r1"]));
        let unit = service.sync_provider_regions("p1").await.unwrap().remove(0);
        let mut events = service.events().subscribe();

        let unit = service.sync_now(&unit.id, SyncRange::default()).await.unwrap();

        assert_eq!(unit.sync_status, SyncStatus::Idle);
        assert!(unit.last_sync_end_at.is_some());
        // first sync of a unit is always deep
        assert!(unit.last_deep_sync_at.is_some());
        assert_eq!(unit.sync_results.unwrap().get("zones").unwrap().add_cnt, 1);

        let phases: Vec<SyncPhase> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|e| e.phase)
            .collect();
        assert_eq!(
            phases,
            vec![SyncPhase::Queued, SyncPhase::Started, SyncPhase::Finished]
        );
    }

    #[tokio::test]
    async fn test_unreachable_region_is_retried_then_absorbed() {
        let (service, provider) = service_with(regions(&["r1"]));
        let unit = service.sync_provider_regions("p1").await.unwrap().remove(0);

        let mut broken = regions(&["r1"]);
        broken.fail.insert("regions".to_string());
        provider.replace(broken);

        let unit = service.sync_now(&unit.id, SyncRange::default()).await.unwrap();
        assert_eq!(unit.sync_status, SyncStatus::Idle);
        assert!(unit.sync_results.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_auto_sync_sweep_submits_due_units_once() {
        let (service, _) = service_with(regions(&["r1"]));
        service.sync_provider_regions("p1").await.unwrap();

        assert_eq!(service.auto_sync_sweep().await.unwrap(), 1);
        tokio::time::sleep(Duration::from_millis(200)).await;

        // just synced: not due again
        assert_eq!(service.auto_sync_sweep().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sweep_skips_a_failing_unit() {
        let (service, _) = service_with(regions(&["r1", "r2"]));
        let units = service.sync_provider_regions("p1").await.unwrap();
        let (gone, kept) = (units[0].clone(), units[1].clone());
        // detached after the sweep listed it
        service.units().detach("p1", &gone.region_id).await.unwrap();

        assert_eq!(service.sweep(units).await, 1);

        for _ in 0..50 {
            let unit = service.units().get(&kept.id).await.unwrap();
            if unit.last_sync_end_at.is_some() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("unit after the failing one was never synced");
    }

    #[tokio::test]
    async fn test_unit_sharing_a_busy_key_goes_back_to_idle() {
        let service = SyncService::new(config(), Database::open_in_memory().unwrap());
        let mut slow = regions(&["r1"]);
        slow.delay_ms = 200;
        service.register_provider(
            ProviderInfo::new("p1", "acme"),
            Arc::new(InventoryProvider::new(slow)),
        );
        service.register_provider(
            ProviderInfo::new("p2", "acme"),
            Arc::new(InventoryProvider::new(regions(&["r1"]))),
        );
        let first = service.sync_provider_regions("p1").await.unwrap().remove(0);
        let second = service.sync_provider_regions("p2").await.unwrap().remove(0);

        let running = service
            .submit_sync_task(&first.id, SyncRange::default())
            .await
            .unwrap();
        let collapsed = service
            .submit_sync_task(&second.id, SyncRange::default())
            .await
            .unwrap();
        assert!(matches!(collapsed, Submission::AlreadyRunning));
        assert_eq!(
            service.units().get(&second.id).await.unwrap().sync_status,
            SyncStatus::Idle
        );

        if let Submission::Started(handle) = running {
            handle.await.unwrap();
        }
        let second = service.units().get(&second.id).await.unwrap();
        assert_eq!(second.sync_status, SyncStatus::Idle);
        assert!(second.can_sync(service.config().stale_after(), Utc::now()));
    }

    #[tokio::test]
    async fn test_open_uses_configured_database_path() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("state").join("sync.db");
        let service = SyncService::open(SyncConfig {
            database_path: Some(path.clone()),
            ..config()
        })
        .unwrap();
        service.register_provider(
            ProviderInfo::new("p1", "acme"),
            Arc::new(InventoryProvider::new(regions(&["r1"]))),
        );
        service.sync_provider_regions("p1").await.unwrap();
        assert!(path.exists());

        let reopened = SyncUnitManager::new(Database::open(&path).unwrap());
        assert_eq!(reopened.list_by_provider("p1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sync_provider_submits_covered_units() {
        let (service, _) = service_with(regions(&["r1", "r2"]));
        let units = service.sync_provider_regions("p1").await.unwrap();

        let mut range = SyncRange::default();
        range.region_ids.insert(units[0].region_id.clone());
        assert_eq!(service.sync_provider("p1", range).await.unwrap(), 1);
    }
}
