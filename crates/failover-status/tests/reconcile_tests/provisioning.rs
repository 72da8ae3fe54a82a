//! Instance CRUD feeding the reconciliation engine

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use failover_common::{Document, InstanceKind, InstanceStatus, ResourceKind};
use failover_status::{
    CreateInstanceRequest, GatewayConfig, InstanceService, ListScope, ResourceClient,
    UpdateInstanceRequest,
};
use failover_store::EventType;

use super::fake_cluster::FakeCluster;
use super::harness;

fn service(cluster: Arc<FakeCluster>) -> InstanceService {
    InstanceService::new(
        cluster,
        InstanceKind::default(),
        GatewayConfig {
            host: Some("redis.example.com".to_string()),
            default_port: 6379,
        },
        Duration::from_secs(5),
    )
}

/// Story: a freshly created instance is picked up by the next sync pass
#[tokio::test]
async fn created_instance_is_first_seen_by_sync() {
    let (cluster, store, engine) = harness();
    let instances = service(cluster.clone());

    let change = instances
        .create(CreateInstanceRequest {
            name: "orders".into(),
            namespace: "team-a".into(),
            redis_replicas: 2,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(change.details, "redisReplicas: 2, sentinelReplicas: 3");

    let namespace = cluster
        .get(ResourceKind::Namespace, "", "team-a")
        .await
        .unwrap();
    assert!(namespace.is_some());

    engine.run_sync_once().await.unwrap();
    let events = store.events_for("orders", "team-a");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].message, "Instance first seen: Provisioning");
}

/// Story: reading an instance reflects its workloads and data service
#[tokio::test]
async fn get_reports_live_status_and_service_port() {
    let (cluster, _, _) = harness();
    cluster.put_instance("team-a", "cache", 3, json!(null));
    cluster.put_workload(ResourceKind::DataReplicaGroup, "team-a", "rfr-cache", 3, 3);
    cluster.put_workload(ResourceKind::SentinelReplicaGroup, "team-a", "rfs-cache", 3, 3);
    cluster
        .create(
            ResourceKind::DataService,
            "team-a",
            &Document::new(json!({
                "metadata": {"name": "rfr-cache", "namespace": "team-a"},
                "spec": {"ports": [{"port": 6379, "nodePort": 31000}]},
            })),
        )
        .await
        .unwrap();

    let instance = service(cluster).get("team-a", "cache").await.unwrap();
    assert_eq!(instance.status, InstanceStatus::Running);
    let connection = instance.connection.unwrap();
    assert_eq!(connection.external_port, 31000);
    assert_eq!(connection.redis_cli, "redis-cli -h redis.example.com -p 31000");
}

/// Story: listing a namespace only returns that namespace's instances
#[tokio::test]
async fn list_is_scoped_to_namespace() {
    let (cluster, _, _) = harness();
    cluster.put_instance("team-a", "cache", 3, json!({"phase": "Running"}));
    cluster.put_instance("team-a", "queue", 3, json!({"phase": "Error"}));
    cluster.put_instance("team-b", "orders", 3, json!({"phase": "Running"}));

    let found = service(cluster)
        .list(&ListScope::Namespace("team-a".into()))
        .await
        .unwrap();
    let summary: Vec<_> = found
        .iter()
        .map(|i| (i.name.as_str(), i.status.clone()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("cache", InstanceStatus::Running),
            ("queue", InstanceStatus::Failed),
        ]
    );
}

/// Story: rescaling changes the desired counts that workloads are judged by
#[tokio::test]
async fn rescale_moves_instance_back_to_provisioning() {
    let (cluster, store, engine) = harness();
    cluster.put_instance("team-a", "cache", 3, json!(null));
    cluster.put_workload(ResourceKind::DataReplicaGroup, "team-a", "rfr-cache", 3, 3);
    cluster.put_workload(ResourceKind::SentinelReplicaGroup, "team-a", "rfs-cache", 3, 3);
    engine.run_sync_once().await.unwrap();

    let change = service(cluster.clone())
        .update_replicas(
            "team-a",
            "cache",
            UpdateInstanceRequest {
                redis_replicas: Some(5),
                sentinel_replicas: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(change.details, "redisReplicas: 3 -> 5");
    assert_eq!(change.instance.redis_replicas, 5);

    engine.run_sync_once().await.unwrap();
    let events = store.events_for("cache", "team-a");
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].event_type, EventType::StatusChange);
    assert_eq!(events[1].message, "Status changed from Running to Provisioning");
}

/// Story: deleting an instance reports its last replica counts
#[tokio::test]
async fn delete_describes_removed_instance() {
    let (cluster, _, _) = harness();
    cluster.put_instance("team-a", "cache", 4, json!(null));
    let instances = service(cluster.clone());

    let details = instances.delete("team-a", "cache").await.unwrap();
    assert_eq!(details, "redisReplicas: 4, sentinelReplicas: 4");

    let err = instances.delete("team-a", "cache").await.unwrap_err();
    assert!(err.is_not_found());
}
