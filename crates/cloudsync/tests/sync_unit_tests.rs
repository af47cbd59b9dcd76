//! Sync unit lifecycle: single flight, scheduling and persistence.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;

use common::{InventoryBuilder, TestHarness};

use cloudsync::cloud::{Inventory, InventoryNode};
use cloudsync::sync::SyncUnitManager;
use cloudsync::{
    AutoSyncLoop, Database, Submission, SyncConfig, SyncError, SyncPhase, SyncRange, SyncStatus,
    SyncUnit,
};

fn small_region() -> Inventory {
    InventoryBuilder::new()
        .region(common::region_with_hosts("r1", vec![common::host("h1", &["vm1"])]))
        .build()
}

async fn wait_for_sync_end(harness: &TestHarness, unit: &SyncUnit) -> SyncUnit {
    for _ in 0..100 {
        let current = harness.service.units().get(&unit.id).await.unwrap();
        if current.last_sync_end_at.is_some() && current.sync_status == SyncStatus::Idle {
            return current;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("unit {} never finished syncing", unit.id);
}

#[tokio::test]
async fn test_duplicate_submission_collapses() {
    let mut inventory = small_region();
    inventory.delay_ms = 200;
    let harness = TestHarness::new(inventory);
    let unit = harness.attach().await;
    let mut events = harness.service.events().subscribe();

    let first = harness
        .service
        .submit_sync_task(&unit.id, SyncRange::default())
        .await
        .unwrap();
    let second = harness
        .service
        .submit_sync_task(&unit.id, SyncRange::default())
        .await
        .unwrap();

    assert!(matches!(second, Submission::AlreadyRunning));
    let Submission::Started(handle) = first else {
        panic!("first submission did not start");
    };
    handle.await.unwrap();

    let phases: Vec<SyncPhase> = std::iter::from_fn(|| events.try_recv().ok())
        .map(|e| e.phase)
        .collect();
    assert_eq!(
        phases.iter().filter(|p| **p == SyncPhase::Finished).count(),
        1
    );
    assert!(phases.contains(&SyncPhase::Skipped));

    let unit = harness.service.units().get(&unit.id).await.unwrap();
    assert_eq!(unit.sync_status, SyncStatus::Idle);
    assert_eq!(harness.service.runner().running(), 0);
}

#[tokio::test]
async fn test_unchanged_region_is_polled_less_often() {
    let harness = TestHarness::from_fixture("public_region.yaml");
    let config = harness.service.config().clone();
    let unit = harness.attach().await;

    let unit = harness.sync(&unit).await;
    assert!(!unit.is_empty_region(false));
    assert_eq!(unit.sync_interval(&config, false), config.sync_interval());

    let unit = harness.sync(&unit).await;
    assert!(unit.is_empty_region(false));
    assert_eq!(
        unit.sync_interval(&config, false),
        config.sync_interval() * config.empty_region_multiplier
    );

    // not due right after a sync, either way
    assert!(!unit.need_sync(&config, false, Utc::now()));
}

#[tokio::test]
async fn test_disabled_unit_is_left_alone() {
    let harness = TestHarness::new(small_region());
    let unit = harness.attach().await;
    harness
        .service
        .units()
        .set_enabled(&unit.id, false)
        .await
        .unwrap();

    assert_eq!(harness.service.auto_sync_sweep().await.unwrap(), 0);
    let err = harness
        .service
        .sync_now(&unit.id, SyncRange::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::UnitDisabled { .. }));

    let unit = harness.service.units().get(&unit.id).await.unwrap();
    assert!(unit.last_sync_at.is_none());
}

#[tokio::test]
async fn test_syncing_unit_is_skipped_until_stale() {
    let harness = TestHarness::new(small_region());
    let unit = harness.attach().await;
    harness.service.units().mark_syncing(&unit.id).await.unwrap();
    assert_eq!(harness.service.auto_sync_sweep().await.unwrap(), 0);

    let stale = TestHarness::with_config(
        small_region(),
        SyncConfig {
            stale_after_secs: 0,
            ..TestHarness::test_config()
        },
    );
    let unit = stale.attach().await;
    stale.service.units().mark_syncing(&unit.id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(stale.service.auto_sync_sweep().await.unwrap(), 1);
    let unit = wait_for_sync_end(&stale, &unit).await;
    assert!(unit.last_auto_sync_at.is_some());
}

#[tokio::test]
async fn test_results_survive_reopen() {
    let harness = TestHarness::new(small_region());
    let unit = harness.attach().await;
    harness.sync(&unit).await;

    let reopened = SyncUnitManager::new(Database::open(&harness.db_path).unwrap());
    let stored = reopened.get(&unit.id).await.unwrap();

    assert_eq!(stored.sync_status, SyncStatus::Idle);
    assert!(stored.last_deep_sync_at.is_some());
    let results = stored.sync_results.clone().expect("results persisted");
    assert_eq!(results.get("hosts").unwrap().add_cnt, 1);
    assert_eq!(results.get("guests").unwrap().add_cnt, 1);
}

#[tokio::test]
async fn test_auto_sync_loop_syncs_new_units() {
    let harness = TestHarness::new(small_region());
    let unit = harness.attach().await;

    let auto_sync = AutoSyncLoop::new(harness.service.clone(), Duration::from_secs(3600));
    let (trigger_tx, trigger_rx) = broadcast::channel(16);
    let handle = auto_sync.start(trigger_rx);
    trigger_tx.send(()).unwrap();

    let unit = wait_for_sync_end(&harness, &unit).await;
    assert!(unit.last_auto_sync_at.is_some());
    assert_eq!(
        unit.sync_results.clone().unwrap().get("zones").unwrap().add_cnt,
        1
    );

    auto_sync.stop();
    let _ = trigger_tx.send(());
    let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
}

#[tokio::test]
async fn test_vanished_region_detaches_unit() {
    let harness = TestHarness::new(
        InventoryBuilder::new()
            .region(InventoryNode::new("r1"))
            .region(InventoryNode::new("r2"))
            .build(),
    );
    let units = harness.service.sync_provider_regions(common::harness::PROVIDER_ID).await.unwrap();
    assert_eq!(units.len(), 2);

    harness.provider.replace(Inventory {
        regions: vec![Arc::new(InventoryNode::new("r2"))],
        ..Default::default()
    });
    let units = harness.service.sync_provider_regions(common::harness::PROVIDER_ID).await.unwrap();
    assert_eq!(units.len(), 1);

    let remaining = harness
        .service
        .units()
        .list_by_provider(common::harness::PROVIDER_ID)
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, units[0].id);
}
