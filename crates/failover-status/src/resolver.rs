//! Status resolution
//!
//! Pure functions that turn observed cluster state into an [`InstanceStatus`].
//! Two sources feed resolution:
//!
//! - the replica counts of the two generated workloads, which are
//!   authoritative once either workload exists, and
//! - the instance resource's own `status` block, which may report a scalar
//!   phase or a list of conditions and is consulted only before any
//!   workload has been created.
//!
//! None of these functions perform I/O; callers fetch documents first.

use serde_json::Value;

use failover_common::{Document, InstanceStatus, PathLookup};

/// Scalar status fields, in priority order
const SCALAR_STATUS_FIELDS: [&str; 3] = ["status.phase", "status.state", "status.status"];

/// Condition types consulted before falling back to the first condition
const CONDITION_PRIORITY: [&str; 4] = ["Ready", "Available", "Reconciling", "Progressing"];

/// Map a reported status token onto the canonical vocabulary.
///
/// Known synonyms collapse to `Running`, `Provisioning` or `Failed`. Anything
/// else is returned verbatim.
pub fn normalize(token: &str) -> InstanceStatus {
    match token {
        "Running" | "Ready" | "Available" | "Healthy" => InstanceStatus::Running,
        "Provisioning" | "Pending" | "Reconciling" | "Progressing" | "Creating" => {
            InstanceStatus::Provisioning
        }
        "Error" | "Failed" | "Degraded" => InstanceStatus::Failed,
        other => InstanceStatus::parse(other),
    }
}

/// Observed replica counts of one workload
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkloadState {
    /// `status.replicas`
    pub replicas: i64,
    /// `status.readyReplicas`
    pub ready_replicas: i64,
}

impl WorkloadState {
    /// Read replica counts from a StatefulSet or Deployment. Missing counts
    /// read as zero.
    pub fn from_document(doc: &Document) -> Self {
        Self {
            replicas: doc.i64_at("status.replicas").unwrap_or(0),
            ready_replicas: doc.i64_at("status.readyReplicas").unwrap_or(0),
        }
    }

    /// Status of this workload given the desired replica count
    pub fn status(&self, expected_replicas: i64) -> InstanceStatus {
        workload_status(self.replicas, self.ready_replicas, expected_replicas)
    }
}

/// Status of a single workload.
///
/// A workload with no replicas is still provisioning. A non-positive
/// `expected_replicas` means "whatever the workload currently runs".
pub fn workload_status(replicas: i64, ready_replicas: i64, expected_replicas: i64) -> InstanceStatus {
    if replicas == 0 {
        return InstanceStatus::Provisioning;
    }
    let expected = if expected_replicas <= 0 {
        replicas
    } else {
        expected_replicas
    };
    if ready_replicas >= expected {
        InstanceStatus::Running
    } else {
        InstanceStatus::Provisioning
    }
}

/// Status of a workload document, `None` when the workload does not exist
pub fn workload_status_from_document(
    doc: Option<&Document>,
    expected_replicas: i64,
) -> Option<InstanceStatus> {
    doc.map(|d| WorkloadState::from_document(d).status(expected_replicas))
}

/// Combine the statuses of the two workload roles.
///
/// `None` means the workload was not found. Both missing means the instance
/// has not been materialized yet.
pub fn instance_live_status(
    data: Option<&InstanceStatus>,
    sentinel: Option<&InstanceStatus>,
) -> InstanceStatus {
    match (data, sentinel) {
        (None, None) => InstanceStatus::Provisioning,
        (Some(InstanceStatus::Failed), _) | (_, Some(InstanceStatus::Failed)) => {
            InstanceStatus::Failed
        }
        (Some(InstanceStatus::Running), Some(InstanceStatus::Running)) => InstanceStatus::Running,
        _ => InstanceStatus::Provisioning,
    }
}

/// Status reported by the instance resource itself.
///
/// Scalar fields win over conditions. Returns `Unknown` when there is no
/// status block or it carries nothing usable.
pub fn status_from_resource_body(resource: &Document) -> InstanceStatus {
    if resource.map_at("status").is_none() {
        return InstanceStatus::Unknown;
    }

    if let Some(token) = SCALAR_STATUS_FIELDS
        .iter()
        .find_map(|path| resource.non_empty_str_at(path))
    {
        return normalize(token);
    }

    match resource.list_at("status.conditions") {
        Some(conditions) if !conditions.is_empty() => {
            status_from_conditions(conditions).unwrap_or(InstanceStatus::Unknown)
        }
        _ => InstanceStatus::Unknown,
    }
}

fn status_from_conditions(conditions: &[Value]) -> Option<InstanceStatus> {
    for wanted in CONDITION_PRIORITY {
        let readiness = matches!(wanted, "Ready" | "Available");
        for condition in conditions.iter().filter(|c| c.is_object()) {
            if condition.str_at("type") != Some(wanted) {
                continue;
            }
            match condition.str_at("status") {
                Some("True") if readiness => return Some(InstanceStatus::Running),
                Some("True") => return Some(normalize(wanted)),
                Some("False") => {
                    if let Some(reason) = condition.non_empty_str_at("reason") {
                        return Some(normalize(reason));
                    }
                    // Not normalized, so it stays distinct from Provisioning
                    if readiness {
                        return Some(InstanceStatus::Other("Pending".to_string()));
                    }
                    return Some(normalize(wanted));
                }
                // "Unknown" or missing: keep scanning
                _ => {}
            }
        }
    }

    let first = conditions.first().filter(|c| c.is_object())?;
    first
        .non_empty_str_at("reason")
        .or_else(|| first.non_empty_str_at("type"))
        .map(normalize)
}

/// Canonical current status of an instance.
///
/// Live workload status overrides the resource body as soon as either
/// workload exists. Before that, the body is used and an unknown result
/// collapses to `Provisioning`.
pub fn resolve_current(
    body_status: &InstanceStatus,
    data: Option<&InstanceStatus>,
    sentinel: Option<&InstanceStatus>,
) -> InstanceStatus {
    if data.is_some() || sentinel.is_some() {
        return instance_live_status(data, sentinel);
    }
    match body_status {
        InstanceStatus::Unknown => InstanceStatus::Provisioning,
        InstanceStatus::Other(token) if token.is_empty() => InstanceStatus::Provisioning,
        status => status.clone(),
    }
}
