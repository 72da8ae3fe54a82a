//! In-memory cluster standing in for the Kubernetes API

use std::collections::HashMap;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::json;

use failover_common::{Document, DocumentList, Error, ResourceKind, Result};
use failover_status::{ListScope, ResourceClient, WatchEvent, WatchStream};

type Key = (ResourceKind, String, String);

/// Objects keyed by kind, namespace and name, plus a controllable watch feed
#[derive(Default)]
pub struct FakeCluster {
    objects: Mutex<HashMap<Key, Document>>,
    resource_version: Mutex<u64>,
    cluster_wide_forbidden: Mutex<bool>,
    denied_namespaces: Mutex<Vec<String>>,
    watchers: Mutex<Vec<mpsc::UnboundedSender<Result<WatchEvent>>>>,
    watch_versions: Mutex<Vec<String>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deny cluster-wide instance listing, as a namespaced role binding would
    pub fn forbid_cluster_wide_list(&self) {
        *self.cluster_wide_forbidden.lock() = true;
    }

    /// Deny listing instances in one namespace
    pub fn deny_namespace(&self, namespace: &str) {
        self.denied_namespaces.lock().push(namespace.to_string());
    }

    pub fn add_namespace(&self, name: &str) {
        self.put(
            ResourceKind::Namespace,
            "",
            name,
            Document::new(json!({"metadata": {"name": name}})),
        );
    }

    /// Store an instance resource with the given spec and status block
    pub fn put_instance(&self, namespace: &str, name: &str, replicas: i64, status: serde_json::Value) {
        self.add_namespace(namespace);
        self.put(
            ResourceKind::Instance,
            namespace,
            name,
            instance(namespace, name, replicas, status),
        );
    }

    /// Store or replace a workload's replica counts
    pub fn put_workload(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        replicas: i64,
        ready: i64,
    ) {
        self.put(
            kind,
            namespace,
            name,
            Document::new(json!({
                "metadata": {"name": name, "namespace": namespace},
                "status": {"replicas": replicas, "readyReplicas": ready},
            })),
        );
    }

    /// Push an event to every open watch
    pub fn emit(&self, event: WatchEvent) {
        self.watchers
            .lock()
            .retain(|tx| tx.unbounded_send(Ok(event.clone())).is_ok());
    }

    /// Push a stream error to every open watch
    pub fn emit_error(&self, message: &str) {
        self.watchers
            .lock()
            .retain(|tx| tx.unbounded_send(Err(Error::internal(message))).is_ok());
    }

    /// End every open watch cleanly
    pub fn close_watches(&self) {
        self.watchers.lock().clear();
    }

    /// Watches whose receiving end is still alive
    pub fn open_watches(&self) -> usize {
        self.watchers.lock().retain(|tx| !tx.is_closed());
        self.watchers.lock().len()
    }

    /// Resource versions every watch was opened from, in order
    pub fn watch_versions(&self) -> Vec<String> {
        self.watch_versions.lock().clone()
    }

    fn put(&self, kind: ResourceKind, namespace: &str, name: &str, doc: Document) {
        *self.resource_version.lock() += 1;
        self.objects
            .lock()
            .insert((kind, namespace.to_string(), name.to_string()), doc);
    }
}

/// An instance resource document
pub fn instance(namespace: &str, name: &str, replicas: i64, status: serde_json::Value) -> Document {
    let mut doc = json!({
        "apiVersion": "databases.spotahome.com/v1",
        "kind": "RedisFailover",
        "metadata": {"name": name, "namespace": namespace},
        "spec": {"redis": {"replicas": replicas}, "sentinel": {"replicas": replicas}},
    });
    if !status.is_null() {
        doc["status"] = status;
    }
    Document::new(doc)
}

#[async_trait]
impl ResourceClient for FakeCluster {
    async fn get(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<Option<Document>> {
        Ok(self
            .objects
            .lock()
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn list(&self, kind: ResourceKind, scope: &ListScope) -> Result<DocumentList> {
        if kind == ResourceKind::Instance {
            match scope {
                ListScope::All if *self.cluster_wide_forbidden.lock() => {
                    return Err(Error::forbidden(
                        "redisfailovers.databases.spotahome.com is forbidden: cannot list at the cluster scope",
                    ));
                }
                ListScope::Namespace(ns) if self.denied_namespaces.lock().contains(ns) => {
                    return Err(Error::forbidden(format!("cannot list in namespace {ns}")));
                }
                _ => {}
            }
        }

        let mut matching: Vec<(String, String, Document)> = self
            .objects
            .lock()
            .iter()
            .filter(|((k, ns, _), _)| {
                *k == kind
                    && match scope {
                        ListScope::All => true,
                        ListScope::Namespace(wanted) => ns == wanted,
                    }
            })
            .map(|((_, ns, name), doc)| (ns.clone(), name.clone(), doc.clone()))
            .collect();
        matching.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
        let items = matching.into_iter().map(|(_, _, doc)| doc).collect();
        let rv = self.resource_version.lock().to_string();
        Ok(DocumentList::new(items, Some(rv)))
    }

    async fn watch(&self, _kind: ResourceKind, resource_version: &str) -> Result<WatchStream> {
        self.watch_versions.lock().push(resource_version.to_string());
        let (tx, rx) = mpsc::unbounded();
        self.watchers.lock().push(tx);
        Ok(rx.boxed())
    }

    async fn create(&self, kind: ResourceKind, namespace: &str, object: &Document) -> Result<Document> {
        let name = object
            .name()
            .ok_or_else(|| Error::validation("metadata.name", "missing"))?
            .to_string();
        self.put(kind, namespace, &name, object.clone());
        Ok(object.clone())
    }

    async fn update(&self, kind: ResourceKind, namespace: &str, object: &Document) -> Result<Document> {
        self.create(kind, namespace, object).await
    }

    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<()> {
        self.objects
            .lock()
            .remove(&(kind, namespace.to_string(), name.to_string()))
            .map(|_| ())
            .ok_or_else(|| Error::not_found(kind.to_string(), namespace, name))
    }
}
