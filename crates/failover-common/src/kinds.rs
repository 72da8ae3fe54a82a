//! Resource kinds the reconciler reads and writes
//!
//! The instance custom resource and its two generated replica groups are
//! addressed through [`ResourceKind`]. Names, API coordinates and the replica
//! field paths of the instance resource are configurable through
//! [`InstanceKind`]; the defaults match the Redis failover operator.

use std::fmt;

use kube::api::GroupVersionKind;
use kube::discovery::ApiResource;

/// Kinds of cluster objects the resource client can address
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// The instance custom resource
    Instance,
    /// Replica group backing the data role
    DataReplicaGroup,
    /// Replica group backing the sentinel role
    SentinelReplicaGroup,
    /// Service exposing the data role
    DataService,
    /// Cluster namespaces
    Namespace,
}

impl ResourceKind {
    /// Whether objects of this kind live in a namespace
    pub fn is_namespaced(self) -> bool {
        !matches!(self, ResourceKind::Namespace)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Instance => "instance",
            ResourceKind::DataReplicaGroup => "data replica group",
            ResourceKind::SentinelReplicaGroup => "sentinel replica group",
            ResourceKind::DataService => "data service",
            ResourceKind::Namespace => "namespace",
        };
        f.write_str(name)
    }
}

/// The two workload roles that make up an instance
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WorkloadRole {
    /// Data nodes (StatefulSet `rfr-<name>`)
    Data,
    /// Sentinel nodes (Deployment `rfs-<name>`)
    Sentinel,
}

impl WorkloadRole {
    /// Both roles in resolution order
    pub const ALL: [WorkloadRole; 2] = [WorkloadRole::Data, WorkloadRole::Sentinel];

    /// The replica-group kind backing this role
    pub fn kind(self) -> ResourceKind {
        match self {
            WorkloadRole::Data => ResourceKind::DataReplicaGroup,
            WorkloadRole::Sentinel => ResourceKind::SentinelReplicaGroup,
        }
    }
}

impl fmt::Display for WorkloadRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkloadRole::Data => f.write_str("data"),
            WorkloadRole::Sentinel => f.write_str("sentinel"),
        }
    }
}

/// API coordinates and field conventions of the instance custom resource
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceKind {
    /// API group (e.g. "databases.spotahome.com")
    pub group: String,
    /// API version (e.g. "v1")
    pub version: String,
    /// Kind (e.g. "RedisFailover")
    pub kind: String,
    /// Plural resource name (e.g. "redisfailovers")
    pub plural: String,
    /// Spec path holding desired data replicas
    pub data_replicas_path: String,
    /// Spec path holding desired sentinel replicas
    pub sentinel_replicas_path: String,
    /// Name prefix of the data StatefulSet and Service
    pub data_prefix: String,
    /// Name prefix of the sentinel Deployment
    pub sentinel_prefix: String,
}

impl Default for InstanceKind {
    fn default() -> Self {
        Self {
            group: "databases.spotahome.com".to_string(),
            version: "v1".to_string(),
            kind: "RedisFailover".to_string(),
            plural: "redisfailovers".to_string(),
            data_replicas_path: "spec.redis.replicas".to_string(),
            sentinel_replicas_path: "spec.sentinel.replicas".to_string(),
            data_prefix: "rfr-".to_string(),
            sentinel_prefix: "rfs-".to_string(),
        }
    }
}

impl InstanceKind {
    /// `group/version` string for manifests
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// Dynamic API resource for the instance custom resource
    pub fn api_resource(&self) -> ApiResource {
        let gvk = GroupVersionKind::gvk(&self.group, &self.version, &self.kind);
        ApiResource::from_gvk_with_plural(&gvk, &self.plural)
    }

    /// Spec path of the desired replica count for `role`
    pub fn replicas_path(&self, role: WorkloadRole) -> &str {
        match role {
            WorkloadRole::Data => &self.data_replicas_path,
            WorkloadRole::Sentinel => &self.sentinel_replicas_path,
        }
    }

    /// Name of the workload generated for `role` of instance `name`
    pub fn workload_name(&self, role: WorkloadRole, name: &str) -> String {
        match role {
            WorkloadRole::Data => format!("{}{}", self.data_prefix, name),
            WorkloadRole::Sentinel => format!("{}{}", self.sentinel_prefix, name),
        }
    }

    /// Name of the Service exposing the data role of instance `name`
    pub fn data_service_name(&self, name: &str) -> String {
        format!("{}{}", self.data_prefix, name)
    }
}
