//! Instance snapshots decoded from the custom resource
//!
//! [`ManagedInstance`] is never persisted; it is rebuilt from the cluster
//! resource on every pass. [`LiveStatus`] carries the observed status of
//! both generated workloads.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use failover_common::{
    Document, Error, InstanceKind, InstanceStatus, PathLookup, Result, WorkloadRole,
};

use crate::client::{with_deadline, ResourceClient};
use crate::resolver::{
    instance_live_status, resolve_current, status_from_resource_body,
    workload_status_from_document,
};

/// Endpoint clients use to reach an instance
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    /// Gateway host
    pub external_host: String,
    /// Gateway or service port
    pub external_port: u16,
    /// Ready-to-paste CLI invocation
    pub redis_cli: String,
}

impl ConnectionInfo {
    /// Connection info for `host:port`
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let redis_cli = format!("redis-cli -h {host} -p {port}");
        Self {
            external_host: host,
            external_port: port,
            redis_cli,
        }
    }
}

/// Point-in-time view of one instance
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedInstance {
    /// Instance name
    pub name: String,
    /// Instance namespace
    pub namespace: String,
    /// Desired data replicas, 0 when unset
    pub redis_replicas: i64,
    /// Desired sentinel replicas, 0 when unset
    pub sentinel_replicas: i64,
    /// Resolved status
    pub status: InstanceStatus,
    /// Resource creation time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Connection endpoint, when requested
    #[serde(flatten)]
    pub connection: Option<ConnectionInfo>,
}

impl ManagedInstance {
    /// Decode an instance resource.
    ///
    /// The status is what the resource body reports; callers refine it with
    /// [`LiveStatus`]. Objects without a name or namespace are malformed.
    pub fn from_document(doc: &Document, kind: &InstanceKind) -> Result<Self> {
        let name = doc
            .name()
            .ok_or_else(|| Error::malformed(kind.kind.as_str(), "missing metadata.name"))?;
        let namespace = doc.namespace().ok_or_else(|| {
            Error::malformed(kind.kind.as_str(), format!("{name} has no metadata.namespace"))
        })?;

        Ok(Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            redis_replicas: doc
                .i64_at(kind.replicas_path(WorkloadRole::Data))
                .unwrap_or(0),
            sentinel_replicas: doc
                .i64_at(kind.replicas_path(WorkloadRole::Sentinel))
                .unwrap_or(0),
            status: status_from_resource_body(doc),
            created_at: doc
                .creation_timestamp()
                .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
                .map(|ts| ts.with_timezone(&Utc)),
            connection: None,
        })
    }

    /// Desired replica count for `role`
    pub fn desired_replicas(&self, role: WorkloadRole) -> i64 {
        match role {
            WorkloadRole::Data => self.redis_replicas,
            WorkloadRole::Sentinel => self.sentinel_replicas,
        }
    }
}

/// Observed status of both workloads; `None` when a workload is absent
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LiveStatus {
    /// Data replica group
    pub data: Option<InstanceStatus>,
    /// Sentinel replica group
    pub sentinel: Option<InstanceStatus>,
}

impl LiveStatus {
    /// Fetch both workloads of `instance` and resolve their statuses.
    ///
    /// A missing workload is not an error. Any other failure is returned so
    /// the caller can skip the instance instead of recording a guess.
    pub async fn observe<C>(
        client: &C,
        kind: &InstanceKind,
        instance: &ManagedInstance,
        deadline: Duration,
    ) -> Result<Self>
    where
        C: ResourceClient + ?Sized,
    {
        let mut live = Self::default();
        for role in WorkloadRole::ALL {
            let workload = kind.workload_name(role, &instance.name);
            let doc = with_deadline(
                deadline,
                "get workload",
                client.get(role.kind(), &instance.namespace, &workload),
            )
            .await?;
            let status = workload_status_from_document(doc.as_ref(), instance.desired_replicas(role));
            match role {
                WorkloadRole::Data => live.data = status,
                WorkloadRole::Sentinel => live.sentinel = status,
            }
        }
        Ok(live)
    }

    /// Combined workload status
    pub fn combined(&self) -> InstanceStatus {
        instance_live_status(self.data.as_ref(), self.sentinel.as_ref())
    }

    /// Current status given what the resource body reports
    pub fn resolve(&self, body_status: &InstanceStatus) -> InstanceStatus {
        resolve_current(body_status, self.data.as_ref(), self.sentinel.as_ref())
    }
}
