//! Per-kind reconciliation rules observed through full syncs.

mod common;

use common::{InventoryBuilder, TestHarness};

use cloudsync::cloud::InventoryNode;
use cloudsync::model::{
    Guest, Host, Network, Record, ResourceBase, Vpc, Wire, Zone, STATUS_UNKNOWN,
};
use cloudsync::SyncResult;

fn named(id: &str, name: &str) -> InventoryNode {
    let mut node = InventoryNode::new(id);
    node.name = name.to_string();
    node
}

#[tokio::test]
async fn test_records_outside_the_compared_set_are_untouched() {
    let harness = TestHarness::new(
        InventoryBuilder::new()
            .region(
                InventoryNode::new("r1").with_child(
                    "vpcs",
                    common::vpc("vpc-1", vec![common::wire("wire-1", &["net-1"])]),
                ),
            )
            .build(),
    );
    let unit = harness.attach().await;
    harness.sync(&unit).await;
    let vpc: Vpc = harness.by_external("vpc-1").await;

    // created by hand, never synced
    let handmade = Wire {
        base: ResourceBase::new("handmade"),
        vpc_id: vpc.base.id.clone(),
        ..Default::default()
    };
    harness.store().insert(&handmade).await.unwrap();

    // synced by another provider account
    let mut foreign = Wire {
        base: ResourceBase::new("foreign"),
        vpc_id: vpc.base.id.clone(),
        ..Default::default()
    };
    foreign.base.external_id = "wire-9".to_string();
    foreign.base.manager_id = "provider-2".to_string();
    harness.store().insert(&foreign).await.unwrap();

    let unit = harness.sync(&unit).await;
    let results = unit.sync_results.clone().unwrap();
    let wires = results.get("wires").unwrap();
    assert_eq!(wires.del_cnt, 0);
    assert_eq!(wires.add_cnt, 0);

    let ids: Vec<String> = harness
        .all::<Wire>()
        .await
        .iter()
        .map(|w| w.id().to_string())
        .collect();
    assert_eq!(ids.len(), 3);
    assert!(ids.contains(&handmade.base.id));
    assert!(ids.contains(&foreign.base.id));
}

#[tokio::test]
async fn test_same_remote_names_get_distinct_local_names() {
    let harness = TestHarness::new(
        InventoryBuilder::new()
            .region(
                InventoryNode::new("r1")
                    .with_child("vpcs", named("vpc-1", "main"))
                    .with_child("vpcs", named("vpc-2", "main")),
            )
            .build(),
    );
    let unit = harness.attach().await;
    harness.sync(&unit).await;

    let mut names: Vec<String> = harness
        .all::<Vpc>()
        .await
        .into_iter()
        .map(|v| v.base.name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["main".to_string(), "main-1".to_string()]);

    // stable across passes
    let unit = harness.sync(&unit).await;
    assert_eq!(unit.sync_results.clone().unwrap().get("vpcs").unwrap().update_cnt, 0);
}

#[tokio::test]
async fn test_duplicate_remote_ids_fail_only_that_kind() {
    let harness = TestHarness::new(
        InventoryBuilder::new()
            .region(
                InventoryNode::new("r1")
                    .with_child("zones", InventoryNode::new("z1"))
                    .with_child("zones", InventoryNode::new("z1"))
                    .with_child("vpcs", InventoryNode::new("vpc-1")),
            )
            .build(),
    );
    let unit = harness.attach().await;
    let unit = harness.sync(&unit).await;
    let results = unit.sync_results.clone().unwrap();

    let zones = results.get("zones").unwrap();
    assert!(zones.is_error());
    assert_eq!(zones.add_cnt, 0);
    assert!(harness.all::<Zone>().await.is_empty());

    assert_eq!(results.get("vpcs").unwrap().add_cnt, 1);
}

#[tokio::test]
async fn test_removed_vpc_takes_its_wires_and_networks() {
    let vpc = common::vpc("vpc-1", vec![common::wire("wire-1", &["net-1", "net-2"])]);
    let harness = TestHarness::new(
        InventoryBuilder::new()
            .region(InventoryNode::new("r1").with_child("vpcs", vpc))
            .build(),
    );
    let unit = harness.attach().await;
    harness.sync(&unit).await;
    assert_eq!(harness.all::<Network>().await.len(), 2);

    harness
        .provider
        .replace(InventoryBuilder::new().region(InventoryNode::new("r1")).build());
    let unit = harness.sync(&unit).await;
    let results = unit.sync_results.clone().unwrap();

    assert_eq!(results.get("vpcs").unwrap().del_cnt, 1);
    assert!(harness.all::<Vpc>().await.is_empty());
    assert!(harness.all::<Wire>().await.is_empty());
    assert!(harness.all::<Network>().await.is_empty());

    let unit = harness.sync(&unit).await;
    assert_eq!(unit.sync_results.clone().unwrap().total(), SyncResult::default());
}

#[tokio::test]
async fn test_removed_wire_with_networks_marks_them_unknown() {
    let harness = TestHarness::new(
        InventoryBuilder::new()
            .region(InventoryNode::new("r1").with_child(
                "vpcs",
                common::vpc("vpc-1", vec![common::wire("wire-1", &["net-1"])]),
            ))
            .build(),
    );
    let unit = harness.attach().await;
    harness.sync(&unit).await;

    harness.provider.replace(
        InventoryBuilder::new()
            .region(InventoryNode::new("r1").with_child("vpcs", common::vpc("vpc-1", vec![])))
            .build(),
    );
    let unit = harness.sync(&unit).await;

    assert_eq!(unit.sync_results.clone().unwrap().get("wires").unwrap().del_cnt, 0);
    let wire: Wire = harness.by_external("wire-1").await;
    assert_eq!(wire.base.status, STATUS_UNKNOWN);
    let network: Network = harness.by_external("net-1").await;
    assert_eq!(network.base.status, STATUS_UNKNOWN);
}

#[tokio::test]
async fn test_removed_host_with_guests_marks_them_unknown() {
    let harness = TestHarness::new(
        InventoryBuilder::new()
            .region(common::region_with_hosts("r1", vec![common::host("h1", &["vm1", "vm2"])]))
            .build(),
    );
    let unit = harness.attach().await;
    harness.sync(&unit).await;

    harness.provider.replace(
        InventoryBuilder::new()
            .region(common::region_with_hosts("r1", vec![]))
            .build(),
    );
    let unit = harness.sync(&unit).await;

    assert_eq!(unit.sync_results.clone().unwrap().get("hosts").unwrap().del_cnt, 0);
    let host: Host = harness.by_external("h1").await;
    assert_eq!(host.base.status, STATUS_UNKNOWN);
    let guests = harness.all::<Guest>().await;
    assert_eq!(guests.len(), 2);
    assert!(guests.iter().all(|g| g.base.status == STATUS_UNKNOWN));
}
