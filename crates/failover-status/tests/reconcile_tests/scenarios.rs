//! Transition scenarios driven through full sync passes

use serde_json::json;

use failover_common::{InstanceStatus, ResourceKind};
use failover_status::PassSummary;
use failover_store::{EventType, NamespaceScope, ServiceLogQuery, ServiceLogReader, StatusCache};

use super::harness;

/// Story: an instance whose workloads do not exist yet is first seen as
/// Provisioning
#[tokio::test]
async fn first_seen_before_workloads_exist() {
    let (cluster, store, engine) = harness();
    cluster.put_instance("team-a", "cache", 3, json!(null));

    let summary = engine.run_sync_once().await.unwrap();
    assert_eq!(
        summary,
        PassSummary {
            instances: 1,
            written: 1,
            failed: 0
        }
    );

    let events = store.events_for("cache", "team-a");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::StatusChange);
    assert_eq!(events[0].from_status_str(), "");
    assert_eq!(events[0].to_status, InstanceStatus::Provisioning);
    assert_eq!(events[0].message, "Instance first seen: Provisioning");
}

/// Story: both workloads becoming ready moves the instance to Running
#[tokio::test]
async fn provisioning_to_running_when_workloads_ready() {
    let (cluster, store, engine) = harness();
    cluster.put_instance("team-a", "cache", 3, json!(null));
    engine.run_sync_once().await.unwrap();

    cluster.put_workload(ResourceKind::DataReplicaGroup, "team-a", "rfr-cache", 3, 3);
    cluster.put_workload(ResourceKind::SentinelReplicaGroup, "team-a", "rfs-cache", 3, 3);
    let summary = engine.run_sync_once().await.unwrap();
    assert_eq!(summary.written, 1);

    let events = store.events_for("cache", "team-a");
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].event_type, EventType::StatusChange);
    assert_eq!(events[1].from_status, Some(InstanceStatus::Provisioning));
    assert_eq!(events[1].to_status, InstanceStatus::Running);
    assert_eq!(events[1].message, "Status changed from Provisioning to Running");
}

/// Story: nothing is written while the status holds steady
#[tokio::test]
async fn steady_running_writes_nothing() {
    let (cluster, store, engine) = harness();
    cluster.put_instance("team-a", "cache", 3, json!(null));
    cluster.put_workload(ResourceKind::DataReplicaGroup, "team-a", "rfr-cache", 3, 3);
    cluster.put_workload(ResourceKind::SentinelReplicaGroup, "team-a", "rfs-cache", 3, 3);
    engine.run_sync_once().await.unwrap();

    for _ in 0..3 {
        assert_eq!(engine.run_sync_once().await.unwrap().written, 0);
    }
    assert_eq!(store.event_count(), 1);
    assert_eq!(
        store.get("cache", "team-a").await.unwrap(),
        Some(InstanceStatus::Running)
    );
}

/// Story: losing a data replica degrades to Provisioning, not Failed
#[tokio::test]
async fn under_ready_data_role_is_provisioning() {
    let (cluster, store, engine) = harness();
    cluster.put_instance("team-a", "cache", 3, json!(null));
    cluster.put_workload(ResourceKind::DataReplicaGroup, "team-a", "rfr-cache", 3, 3);
    cluster.put_workload(ResourceKind::SentinelReplicaGroup, "team-a", "rfs-cache", 3, 3);
    engine.run_sync_once().await.unwrap();

    cluster.put_workload(ResourceKind::DataReplicaGroup, "team-a", "rfr-cache", 3, 2);
    engine.run_sync_once().await.unwrap();

    let events = store.events_for("cache", "team-a");
    let last = events.last().unwrap();
    assert_eq!(last.event_type, EventType::StatusChange);
    assert_eq!(last.from_status, Some(InstanceStatus::Running));
    assert_eq!(last.to_status, InstanceStatus::Provisioning);
}

/// Story: a resource reporting failure before its workloads exist records
/// a failure event
#[tokio::test]
async fn body_failure_before_workloads_is_failure_event() {
    let (cluster, store, engine) = harness();
    cluster.put_instance("team-a", "cache", 3, json!({"phase": "Creating"}));
    engine.run_sync_once().await.unwrap();

    cluster.put_instance(
        "team-a",
        "cache",
        3,
        json!({"conditions": [{"type": "Ready", "status": "False", "reason": "Error"}]}),
    );
    engine.run_sync_once().await.unwrap();

    let events = store.events_for("cache", "team-a");
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].event_type, EventType::Failure);
    assert_eq!(events[1].message, "Status changed from Provisioning to Failed");
}

/// Story: without cluster-wide list access every namespace is listed on
/// its own, and unreadable namespaces are skipped
#[tokio::test]
async fn forbidden_cluster_list_falls_back_per_namespace() {
    let (cluster, store, engine) = harness();
    cluster.put_instance("team-a", "cache", 3, json!(null));
    cluster.put_instance("team-b", "orders", 3, json!(null));
    cluster.put_instance("team-c", "sessions", 3, json!(null));
    cluster.forbid_cluster_wide_list();
    cluster.deny_namespace("team-b");

    let summary = engine.run_sync_once().await.unwrap();
    assert_eq!(summary.instances, 2);
    assert_eq!(summary.written, 2);

    let page = store
        .query(&ServiceLogQuery {
            scope: NamespaceScope::Admin,
            ..Default::default()
        })
        .await
        .unwrap();
    let mut namespaces: Vec<_> = page.items.iter().map(|e| e.namespace.as_str()).collect();
    namespaces.sort();
    assert_eq!(namespaces, vec!["team-a", "team-c"]);
}

/// Story: the event chain of one instance is contiguous across many passes
#[tokio::test]
async fn event_chain_stays_contiguous() {
    let (cluster, store, engine) = harness();
    cluster.put_instance("team-a", "cache", 3, json!(null));
    engine.run_sync_once().await.unwrap();

    let steps = [(1, 0, 3, 3), (3, 3, 3, 3), (3, 3, 3, 3), (3, 1, 3, 3), (3, 3, 3, 3)];
    for (data, data_ready, sentinel, sentinel_ready) in steps {
        cluster.put_workload(ResourceKind::DataReplicaGroup, "team-a", "rfr-cache", data, data_ready);
        cluster.put_workload(
            ResourceKind::SentinelReplicaGroup,
            "team-a",
            "rfs-cache",
            sentinel,
            sentinel_ready,
        );
        engine.run_sync_once().await.unwrap();
    }

    let events = store.events_for("cache", "team-a");
    let path: Vec<_> = events.iter().map(|e| e.to_status.to_string()).collect();
    assert_eq!(
        path,
        vec!["Provisioning", "Running", "Provisioning", "Running"]
    );
    assert_eq!(events[0].from_status, None);
    for pair in events.windows(2) {
        assert_eq!(pair[1].from_status.as_ref(), Some(&pair[0].to_status));
    }
}
