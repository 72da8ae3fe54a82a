//! Watch loop behavior against a controllable event feed

use std::time::Duration;

use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use failover_common::{InstanceStatus, ResourceKind};
use failover_status::{Engine, WatchEvent};

use super::fake_cluster::instance;
use super::harness;

fn spawn_watch(engine: &Engine, cancel: &CancellationToken) -> JoinHandle<()> {
    let engine = engine.clone();
    let cancel = cancel.clone();
    tokio::spawn(async move { engine.run_watch_loop(cancel).await })
}

/// Let spawned tasks run without crossing any backoff delay
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Story: changes delivered over the watch are recorded as they arrive
#[tokio::test(start_paused = true)]
async fn watch_events_record_transitions() {
    let (cluster, store, engine) = harness();
    cluster.put_instance("team-a", "cache", 3, json!(null));
    let cancel = CancellationToken::new();
    let handle = spawn_watch(&engine, &cancel);

    settle().await;
    assert_eq!(cluster.open_watches(), 1);

    cluster.emit(WatchEvent::Added(instance("team-a", "cache", 3, json!(null))));
    settle().await;
    assert_eq!(store.events_for("cache", "team-a").len(), 1);

    cluster.put_workload(ResourceKind::DataReplicaGroup, "team-a", "rfr-cache", 3, 3);
    cluster.put_workload(ResourceKind::SentinelReplicaGroup, "team-a", "rfs-cache", 3, 3);
    cluster.emit(WatchEvent::Modified(instance("team-a", "cache", 3, json!(null))));
    cluster.emit(WatchEvent::Deleted(instance("team-a", "cache", 3, json!(null))));
    settle().await;

    let events = store.events_for("cache", "team-a");
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].to_status, InstanceStatus::Running);

    cancel.cancel();
    handle.await.unwrap();
}

/// Story: a watch closed by the server reopens from a fresh list
#[tokio::test(start_paused = true)]
async fn closed_watch_reopens_from_new_resource_version() {
    let (cluster, _, engine) = harness();
    cluster.put_instance("team-a", "cache", 3, json!(null));
    let cancel = CancellationToken::new();
    let handle = spawn_watch(&engine, &cancel);

    settle().await;
    cluster.put_instance("team-a", "queue", 3, json!(null));
    cluster.close_watches();
    settle().await;

    assert_eq!(cluster.watch_versions(), vec!["2", "4"]);
    assert_eq!(cluster.open_watches(), 1);

    cancel.cancel();
    handle.await.unwrap();
}

/// Story: a broken watch waits out the backoff before reconnecting
#[tokio::test(start_paused = true)]
async fn stream_error_reconnects_after_backoff() {
    let (cluster, _, engine) = harness();
    cluster.put_instance("team-a", "cache", 3, json!(null));
    let cancel = CancellationToken::new();
    let handle = spawn_watch(&engine, &cancel);

    settle().await;
    cluster.emit_error("410 Gone: too old resource version");

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(cluster.watch_versions().len(), 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(cluster.watch_versions().len(), 2);

    cancel.cancel();
    handle.await.unwrap();
}

/// Story: the per-namespace fallback has no resource version to resume from
#[tokio::test(start_paused = true)]
async fn forbidden_list_watches_from_zero() {
    let (cluster, _, engine) = harness();
    cluster.put_instance("team-a", "cache", 3, json!(null));
    cluster.forbid_cluster_wide_list();
    let cancel = CancellationToken::new();
    let handle = spawn_watch(&engine, &cancel);

    settle().await;
    assert_eq!(cluster.watch_versions(), vec!["0"]);

    cancel.cancel();
    handle.await.unwrap();
}

/// Story: shutdown closes the open watch connection
#[tokio::test(start_paused = true)]
async fn cancel_closes_watch() {
    let (cluster, _, engine) = harness();
    let cancel = CancellationToken::new();
    let handle = spawn_watch(&engine, &cancel);

    settle().await;
    assert_eq!(cluster.open_watches(), 1);

    cancel.cancel();
    handle.await.unwrap();
    assert_eq!(cluster.open_watches(), 0);
}

/// Story: start records existing instances before returning and both loops
/// stop on shutdown
#[tokio::test(start_paused = true)]
async fn start_warms_cache_then_runs_loops() {
    let (cluster, store, engine) = harness();
    cluster.put_instance("team-a", "cache", 3, json!(null));
    cluster.put_instance("team-b", "orders", 3, json!({"phase": "Running"}));

    let cancel = CancellationToken::new();
    let handle = engine.start(cancel.clone()).await;
    assert_eq!(store.event_count(), 2);
    assert_eq!(
        store.entry("orders", "team-b").map(|e| e.status),
        Some(InstanceStatus::Running)
    );

    settle().await;
    assert_eq!(cluster.open_watches(), 1);

    cluster.put_workload(ResourceKind::DataReplicaGroup, "team-a", "rfr-cache", 3, 3);
    cluster.put_workload(ResourceKind::SentinelReplicaGroup, "team-a", "rfs-cache", 3, 3);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(
        store.entry("cache", "team-a").map(|e| e.status),
        Some(InstanceStatus::Running)
    );
    assert_eq!(store.event_count(), 3);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle.join())
        .await
        .expect("loops should stop on cancellation");
    assert_eq!(cluster.open_watches(), 0);
}
