//! Transition detection
//!
//! Compares an instance's current status with the cached one and records at
//! most one service-log event per change. The first observation of an
//! instance is itself a transition from the empty state.
//!
//! The cache read, the event insert and the cache write are separate calls.
//! Two loops observing the same change concurrently may both record it; the
//! next observation converges the cache again.

use chrono::Utc;
use tracing::{debug, info, warn};

use failover_common::metrics;
use failover_common::{InstanceStatus, Result};
use failover_store::{EventType, ServiceLogEvent, ServiceLogSink, StatusCache};

/// Identity of an instance within the cluster
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InstanceRef<'a> {
    /// Instance name
    pub name: &'a str,
    /// Instance namespace
    pub namespace: &'a str,
}

/// Build the service-log event for a transition from `cached` to `current`
pub fn transition_event(
    instance: InstanceRef<'_>,
    cached: Option<&InstanceStatus>,
    current: &InstanceStatus,
) -> ServiceLogEvent {
    let (event_type, message) = match cached {
        None => (
            EventType::StatusChange,
            format!("Instance first seen: {current}"),
        ),
        Some(from) => (
            EventType::for_target(current),
            format!("Status changed from {from} to {current}"),
        ),
    };
    ServiceLogEvent {
        instance_name: instance.name.to_string(),
        namespace: instance.namespace.to_string(),
        event_type,
        from_status: cached.cloned(),
        to_status: current.clone(),
        message,
        details: None,
        timestamp: Utc::now(),
    }
}

/// Record a transition if `current` differs from the cached status.
///
/// Returns whether an event was written. A failed cache read or event insert
/// aborts this instance with an error; a failed cache write after a
/// successful insert is logged and otherwise ignored.
pub async fn detect_transition(
    cache: &dyn StatusCache,
    log: &dyn ServiceLogSink,
    instance: InstanceRef<'_>,
    current: &InstanceStatus,
) -> Result<bool> {
    let cached = cache.get(instance.name, instance.namespace).await?;
    if cached.as_ref() == Some(current) {
        return Ok(false);
    }

    let event = transition_event(instance, cached.as_ref(), current);
    log.insert(&event).await?;
    metrics::record_transition(event.event_type.as_str());

    match &cached {
        None => info!(
            instance = %instance.name,
            namespace = %instance.namespace,
            status = %current,
            "instance first seen"
        ),
        Some(from) => info!(
            instance = %instance.name,
            namespace = %instance.namespace,
            from = %from,
            to = %current,
            event_type = %event.event_type,
            "instance status changed"
        ),
    }

    if let Err(e) = cache.set(instance.name, instance.namespace, current).await {
        warn!(
            instance = %instance.name,
            namespace = %instance.namespace,
            error = %e,
            "failed to update status cache after recording transition"
        );
    } else {
        debug!(instance = %instance.name, namespace = %instance.namespace, "status cache updated");
    }

    Ok(true)
}
