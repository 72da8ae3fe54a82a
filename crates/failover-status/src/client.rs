//! Cluster resource access
//!
//! The reconciler and the provisioning service only see schemaless
//! [`Document`]s through [`ResourceClient`]. [`KubeResourceClient`] backs the
//! trait with kube-rs dynamic APIs; tests substitute mocks or fakes.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{Namespace as CoreNamespace, Service};
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, PostParams, WatchParams};
use kube::core::{TypeMeta, WatchEvent as KubeWatchEvent};
use kube::discovery::ApiResource;
use kube::Client;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use failover_common::{
    Document, DocumentList, Error, InstanceKind, ResourceKind, Result, SYSTEM_NAMESPACES,
};

/// Where a list call looks
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListScope {
    /// Every namespace the caller can see
    All,
    /// A single namespace
    Namespace(String),
}

/// A change delivered by a watch stream
#[derive(Clone, Debug, PartialEq)]
pub enum WatchEvent {
    /// Object created, or present when the watch started
    Added(Document),
    /// Object changed
    Modified(Document),
    /// Object removed
    Deleted(Document),
}

/// Stream of watch events. Ends when the server closes the connection.
pub type WatchStream = BoxStream<'static, Result<WatchEvent>>;

/// Generic access to cluster objects as documents
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Fetch one object, `None` if it does not exist.
    ///
    /// `namespace` is ignored for cluster-scoped kinds.
    async fn get(&self, kind: ResourceKind, namespace: &str, name: &str)
        -> Result<Option<Document>>;

    /// List objects of a kind
    async fn list(&self, kind: ResourceKind, scope: &ListScope) -> Result<DocumentList>;

    /// Watch objects of a kind across all namespaces from `resource_version`
    async fn watch(&self, kind: ResourceKind, resource_version: &str) -> Result<WatchStream>;

    /// Create an object and return what the server stored
    async fn create(&self, kind: ResourceKind, namespace: &str, object: &Document)
        -> Result<Document>;

    /// Replace an existing object and return what the server stored
    async fn update(&self, kind: ResourceKind, namespace: &str, object: &Document)
        -> Result<Document>;

    /// Delete an object. A missing object is [`Error::NotFound`].
    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<()>;

    /// Names of every namespace, skipping entries without a name
    async fn list_namespace_names(&self) -> Result<Vec<String>> {
        let namespaces = self.list(ResourceKind::Namespace, &ListScope::All).await?;
        Ok(namespaces
            .items
            .iter()
            .filter_map(|ns| ns.name().map(str::to_string))
            .collect())
    }
}

/// Make sure a tenant namespace exists, creating it if needed.
///
/// System namespaces and the empty name are left alone.
pub async fn ensure_namespace<C>(client: &C, name: &str) -> Result<()>
where
    C: ResourceClient + ?Sized,
{
    if name.is_empty() || SYSTEM_NAMESPACES.contains(&name) {
        return Ok(());
    }
    if client.get(ResourceKind::Namespace, "", name).await?.is_some() {
        return Ok(());
    }

    debug!(namespace = %name, "creating namespace");
    let manifest = Document::new(serde_json::json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": {"name": name},
    }));
    client
        .create(ResourceKind::Namespace, "", &manifest)
        .await
        .map(|_| ())
}

/// Run a cluster call under a deadline, mapping expiry to [`Error::Timeout`]
pub async fn with_deadline<T, F>(deadline: Duration, operation: &str, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(deadline, call)
        .await
        .map_err(|_| Error::timeout(operation))?
}

/// [`ResourceClient`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeResourceClient {
    client: Client,
    instance: InstanceKind,
}

impl KubeResourceClient {
    /// Wrap a kube client. `instance` describes the instance custom resource.
    pub fn new(client: Client, instance: InstanceKind) -> Self {
        Self { client, instance }
    }

    fn api_resource(&self, kind: ResourceKind) -> ApiResource {
        match kind {
            ResourceKind::Instance => self.instance.api_resource(),
            ResourceKind::DataReplicaGroup => ApiResource::erase::<StatefulSet>(&()),
            ResourceKind::SentinelReplicaGroup => ApiResource::erase::<Deployment>(&()),
            ResourceKind::DataService => ApiResource::erase::<Service>(&()),
            ResourceKind::Namespace => ApiResource::erase::<CoreNamespace>(&()),
        }
    }

    fn api(&self, kind: ResourceKind, namespace: Option<&str>) -> (Api<DynamicObject>, ApiResource) {
        let resource = self.api_resource(kind);
        let api = match namespace {
            Some(ns) if kind.is_namespaced() => {
                Api::namespaced_with(self.client.clone(), ns, &resource)
            }
            _ => Api::all_with(self.client.clone(), &resource),
        };
        (api, resource)
    }
}

/// List items come back without `apiVersion`/`kind`; fill them in so every
/// document is self-describing.
fn to_document(mut object: DynamicObject, resource: &ApiResource) -> Result<Document> {
    if object.types.is_none() {
        object.types = Some(TypeMeta {
            api_version: resource.api_version.clone(),
            kind: resource.kind.clone(),
        });
    }
    Document::from_object(&object)
}

/// Map one raw watch item. Bookmarks are dropped; a line that does not
/// decode is [`Error::Malformed`] so the session can skip it.
fn watch_event(
    event: kube::Result<KubeWatchEvent<DynamicObject>>,
    resource: &ApiResource,
) -> Option<Result<WatchEvent>> {
    match event {
        Ok(KubeWatchEvent::Added(o)) => Some(to_document(o, resource).map(WatchEvent::Added)),
        Ok(KubeWatchEvent::Modified(o)) => Some(to_document(o, resource).map(WatchEvent::Modified)),
        Ok(KubeWatchEvent::Deleted(o)) => Some(to_document(o, resource).map(WatchEvent::Deleted)),
        Ok(KubeWatchEvent::Bookmark(_)) => None,
        Ok(KubeWatchEvent::Error(response)) => Some(Err(Error::from(kube::Error::Api(response)))),
        Err(kube::Error::SerdeError(e)) => {
            Some(Err(Error::malformed(resource.kind.as_str(), e.to_string())))
        }
        Err(e) => Some(Err(Error::from(e))),
    }
}

fn from_document(object: &Document) -> Result<DynamicObject> {
    object.to_object()
}

fn required_name(object: &Document) -> Result<&str> {
    object
        .name()
        .ok_or_else(|| Error::validation("metadata.name", "object has no name"))
}

#[async_trait]
impl ResourceClient for KubeResourceClient {
    async fn get(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Document>> {
        let (api, resource) = self.api(kind, Some(namespace));
        api.get_opt(name)
            .await?
            .map(|object| to_document(object, &resource))
            .transpose()
    }

    async fn list(&self, kind: ResourceKind, scope: &ListScope) -> Result<DocumentList> {
        let namespace = match scope {
            ListScope::All => None,
            ListScope::Namespace(ns) => Some(ns.as_str()),
        };
        let (api, resource) = self.api(kind, namespace);
        let list = api.list(&ListParams::default()).await?;
        let items = list
            .items
            .into_iter()
            .map(|object| to_document(object, &resource))
            .collect::<Result<Vec<_>>>()?;
        Ok(DocumentList::new(items, list.metadata.resource_version))
    }

    async fn watch(&self, kind: ResourceKind, resource_version: &str) -> Result<WatchStream> {
        let (api, resource) = self.api(kind, None);
        let stream = api.watch(&WatchParams::default(), resource_version).await?;
        let events = stream
            .filter_map(move |event| futures::future::ready(watch_event(event, &resource)));
        Ok(events.boxed())
    }

    async fn create(
        &self,
        kind: ResourceKind,
        namespace: &str,
        object: &Document,
    ) -> Result<Document> {
        let (api, resource) = self.api(kind, Some(namespace));
        let created = api.create(&PostParams::default(), &from_document(object)?).await?;
        to_document(created, &resource)
    }

    async fn update(
        &self,
        kind: ResourceKind,
        namespace: &str,
        object: &Document,
    ) -> Result<Document> {
        let name = required_name(object)?;
        let (api, resource) = self.api(kind, Some(namespace));
        let updated = api
            .replace(name, &PostParams::default(), &from_document(object)?)
            .await?;
        to_document(updated, &resource)
    }

    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<()> {
        let (api, _) = self.api(kind, Some(namespace));
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(response)) if response.code == 404 => {
                Err(Error::not_found(kind.to_string(), namespace, name))
            }
            Err(e) => Err(e.into()),
        }
    }
}
