//! Reconciliation scenarios against a fake cluster

mod fake_cluster;
mod provisioning;
mod scenarios;
mod watch_loop;

use std::sync::Arc;
use std::time::Duration;

use failover_common::InstanceKind;
use failover_status::{Engine, EngineConfig};
use failover_store::MemoryStore;

use fake_cluster::FakeCluster;

/// Engine wired to a fresh fake cluster and store
pub fn harness() -> (Arc<FakeCluster>, Arc<MemoryStore>, Engine) {
    let cluster = Arc::new(FakeCluster::new());
    let store = Arc::new(MemoryStore::new());
    let engine = Engine::new(
        cluster.clone(),
        store.clone(),
        store.clone(),
        InstanceKind::default(),
        EngineConfig {
            request_timeout: Duration::from_secs(5),
            ..Default::default()
        },
    );
    (cluster, store, engine)
}
