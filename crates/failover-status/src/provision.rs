//! Instance provisioning
//!
//! [`InstanceService`] creates, reads, rescales and deletes instance
//! resources on behalf of the REST layer. Reads resolve status on demand
//! from the resource body, falling back to the live workloads when the body
//! reports nothing, and attach gateway connection info.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};

use failover_common::{
    Document, Error, InstanceKind, InstanceStatus, PathLookup, ResourceKind, Result,
    WorkloadRole, DEFAULT_NAMESPACE,
};

use crate::client::{ensure_namespace, with_deadline, ListScope, ResourceClient};
use crate::instance::{ConnectionInfo, LiveStatus, ManagedInstance};

/// Replica count used when a create request leaves it unset
pub const DEFAULT_REPLICAS: i64 = 3;
/// Port advertised when the data service exposes none
pub const DEFAULT_GATEWAY_PORT: u16 = 6379;

/// Where clients reach instances from outside the cluster
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayConfig {
    /// External host; connection info cannot be built without it
    pub host: Option<String>,
    /// Port used when the data service has none
    pub default_port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: None,
            default_port: DEFAULT_GATEWAY_PORT,
        }
    }
}

impl GatewayConfig {
    /// Connection info for `port`, or the default port when `None`
    pub fn connection_info(&self, port: Option<u16>) -> Result<ConnectionInfo> {
        let host = self
            .host
            .as_deref()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::validation("gateway.host", "gateway host is not configured"))?;
        Ok(ConnectionInfo::new(host, port.unwrap_or(self.default_port)))
    }
}

/// Request to create an instance
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateInstanceRequest {
    /// Instance name; generated when empty
    pub name: String,
    /// Target namespace; `default` when empty
    pub namespace: String,
    /// Data replicas; non-positive means the default
    pub redis_replicas: i64,
    /// Sentinel replicas; non-positive means the default
    pub sentinel_replicas: i64,
}

/// Request to rescale an instance
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateInstanceRequest {
    /// New data replica count
    pub redis_replicas: Option<i64>,
    /// New sentinel replica count
    pub sentinel_replicas: Option<i64>,
}

impl UpdateInstanceRequest {
    fn validate(&self) -> Result<()> {
        if self.redis_replicas.is_none() && self.sentinel_replicas.is_none() {
            return Err(Error::validation(
                "replicas",
                "provide at least one of redisReplicas or sentinelReplicas",
            ));
        }
        for (field, value) in [
            ("redisReplicas", self.redis_replicas),
            ("sentinelReplicas", self.sentinel_replicas),
        ] {
            if matches!(value, Some(n) if n <= 0) {
                return Err(Error::validation(field, "must be greater than 0"));
            }
        }
        Ok(())
    }
}

/// Result of a mutating call: the instance plus an audit description
#[derive(Clone, Debug, PartialEq)]
pub struct InstanceChange {
    /// Instance after the change
    pub instance: ManagedInstance,
    /// Human readable summary of what changed
    pub details: String,
}

/// Instance CRUD over the resource client
#[derive(Clone)]
pub struct InstanceService {
    client: Arc<dyn ResourceClient>,
    kind: InstanceKind,
    gateway: GatewayConfig,
    request_timeout: Duration,
}

impl InstanceService {
    /// Create a service
    pub fn new(
        client: Arc<dyn ResourceClient>,
        kind: InstanceKind,
        gateway: GatewayConfig,
        request_timeout: Duration,
    ) -> Self {
        Self {
            client,
            kind,
            gateway,
            request_timeout,
        }
    }

    /// Manifest for a new instance resource
    pub fn build_manifest(
        &self,
        name: &str,
        namespace: &str,
        redis_replicas: i64,
        sentinel_replicas: i64,
    ) -> Result<Document> {
        instance_manifest(&self.kind, name, namespace, redis_replicas, sentinel_replicas)
    }

    /// Create an instance. Unset replica counts default to 3 and an empty
    /// name becomes `redis-<timestamp>`.
    #[instrument(skip(self, request), fields(namespace = %request.namespace))]
    pub async fn create(&self, request: CreateInstanceRequest) -> Result<InstanceChange> {
        let now = Utc::now();
        let name = if request.name.is_empty() {
            format!("redis-{}", now.format("%Y%m%d%H%M%S"))
        } else {
            request.name
        };
        let namespace = if request.namespace.is_empty() {
            DEFAULT_NAMESPACE.to_string()
        } else {
            request.namespace
        };
        let redis_replicas = positive_or_default(request.redis_replicas);
        let sentinel_replicas = positive_or_default(request.sentinel_replicas);

        ensure_namespace(self.client.as_ref(), &namespace).await?;
        let manifest = self.build_manifest(&name, &namespace, redis_replicas, sentinel_replicas)?;
        self.deadline(
            "create instance",
            self.client
                .create(ResourceKind::Instance, &namespace, &manifest),
        )
        .await?;
        info!(instance = %name, namespace = %namespace, redis_replicas, sentinel_replicas, "instance created");

        let instance = ManagedInstance {
            name,
            namespace,
            redis_replicas,
            sentinel_replicas,
            status: InstanceStatus::Provisioning,
            created_at: Some(now),
            connection: Some(self.gateway.connection_info(None)?),
        };
        Ok(InstanceChange {
            details: replicas_summary(&instance),
            instance,
        })
    }

    /// Fetch one instance with its resolved status and connection info
    pub async fn get(&self, namespace: &str, name: &str) -> Result<ManagedInstance> {
        let doc = self.fetch(namespace, name).await?;
        self.describe(&doc).await
    }

    /// List instances in `scope`, resolving each one's status
    pub async fn list(&self, scope: &ListScope) -> Result<Vec<ManagedInstance>> {
        let list = self
            .deadline(
                "list instances",
                self.client.list(ResourceKind::Instance, scope),
            )
            .await?;

        let mut instances = Vec::with_capacity(list.len());
        for doc in &list.items {
            match self.describe(doc).await {
                Ok(instance) => instances.push(instance),
                Err(e @ Error::Malformed { .. }) => warn!(error = %e, "skipping malformed instance"),
                Err(e) => return Err(e),
            }
        }
        Ok(instances)
    }

    /// Change replica counts. At least one count must be given and every
    /// given count must be positive.
    #[instrument(skip(self, request))]
    pub async fn update_replicas(
        &self,
        namespace: &str,
        name: &str,
        request: UpdateInstanceRequest,
    ) -> Result<InstanceChange> {
        request.validate()?;

        let mut doc = self.fetch(namespace, name).await?;
        let mut changes = Vec::new();
        for (role, label, wanted) in [
            (WorkloadRole::Data, "redisReplicas", request.redis_replicas),
            (WorkloadRole::Sentinel, "sentinelReplicas", request.sentinel_replicas),
        ] {
            let Some(wanted) = wanted else { continue };
            let path = self.kind.replicas_path(role);
            let before = doc.i64_at(path).unwrap_or(0);
            if before != wanted {
                changes.push(format!("{label}: {before} -> {wanted}"));
            }
            doc.set(path, json!(wanted))?;
        }

        let updated = self
            .deadline(
                "update instance",
                self.client.update(ResourceKind::Instance, namespace, &doc),
            )
            .await?;
        info!(instance = %name, namespace = %namespace, changes = ?changes, "instance updated");

        Ok(InstanceChange {
            instance: self.describe(&updated).await?,
            details: changes.join(", "),
        })
    }

    /// Delete an instance and return a description of what was removed.
    ///
    /// The description is empty when the instance could not be read first.
    #[instrument(skip(self))]
    pub async fn delete(&self, namespace: &str, name: &str) -> Result<String> {
        let details = match self.fetch(namespace, name).await {
            Ok(doc) => ManagedInstance::from_document(&doc, &self.kind)
                .map(|before| replicas_summary(&before))
                .unwrap_or_default(),
            Err(_) => String::new(),
        };

        self.deadline(
            "delete instance",
            self.client.delete(ResourceKind::Instance, namespace, name),
        )
        .await?;
        info!(instance = %name, namespace = %namespace, "instance deleted");
        Ok(details)
    }

    /// Port clients should use: the data service's first node port, else
    /// its port. `None` when the service or its ports are missing.
    pub async fn service_port(&self, namespace: &str, name: &str) -> Option<u16> {
        let service_name = self.kind.data_service_name(name);
        let service = self
            .deadline(
                "get service",
                self.client
                    .get(ResourceKind::DataService, namespace, &service_name),
            )
            .await
            .ok()
            .flatten()?;

        let port = service.list_at("spec.ports")?.first()?;
        port.i64_at("nodePort")
            .filter(|p| *p > 0)
            .or_else(|| port.i64_at("port").filter(|p| *p > 0))
            .and_then(|p| u16::try_from(p).ok())
    }

    async fn fetch(&self, namespace: &str, name: &str) -> Result<Document> {
        self.deadline(
            "get instance",
            self.client.get(ResourceKind::Instance, namespace, name),
        )
        .await?
        .ok_or_else(|| Error::not_found(self.kind.kind.as_str(), namespace, name))
    }

    async fn describe(&self, doc: &Document) -> Result<ManagedInstance> {
        let mut instance = ManagedInstance::from_document(doc, &self.kind)?;
        if instance.status == InstanceStatus::Unknown {
            let live =
                LiveStatus::observe(self.client.as_ref(), &self.kind, &instance, self.request_timeout)
                    .await?;
            instance.status = live.combined();
        }
        let port = self.service_port(&instance.namespace, &instance.name).await;
        instance.connection = Some(self.gateway.connection_info(port)?);
        Ok(instance)
    }

    async fn deadline<T>(
        &self,
        operation: &str,
        call: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        with_deadline(self.request_timeout, operation, call).await
    }
}

/// Manifest of an instance resource with the given replica counts
pub fn instance_manifest(
    kind: &InstanceKind,
    name: &str,
    namespace: &str,
    redis_replicas: i64,
    sentinel_replicas: i64,
) -> Result<Document> {
    let mut manifest = Document::new(json!({
        "apiVersion": kind.api_version(),
        "kind": kind.kind,
        "metadata": {"name": name, "namespace": namespace},
    }));
    manifest.set(kind.replicas_path(WorkloadRole::Data), json!(redis_replicas))?;
    manifest.set(kind.replicas_path(WorkloadRole::Sentinel), json!(sentinel_replicas))?;
    Ok(manifest)
}

fn positive_or_default(replicas: i64) -> i64 {
    if replicas <= 0 {
        DEFAULT_REPLICAS
    } else {
        replicas
    }
}

fn replicas_summary(instance: &ManagedInstance) -> String {
    format!(
        "redisReplicas: {}, sentinelReplicas: {}",
        instance.redis_replicas, instance.sentinel_replicas
    )
}
