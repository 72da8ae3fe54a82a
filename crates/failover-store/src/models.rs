//! Records persisted by the status cache and the service log

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use failover_common::InstanceStatus;

/// Kind of transition recorded in the service log
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Any transition that does not end in `Failed`
    StatusChange,
    /// A transition into `Failed`
    Failure,
}

impl EventType {
    /// Event type for a transition ending in `to`
    pub fn for_target(to: &InstanceStatus) -> Self {
        if to.is_failed() {
            Self::Failure
        } else {
            Self::StatusChange
        }
    }

    /// Stored string form
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StatusChange => "status_change",
            Self::Failure => "failure",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable entry of the service log.
///
/// `from_status` is `None` for the first observation of an instance and is
/// stored as an absent field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceLogEvent {
    /// Instance name
    pub instance_name: String,
    /// Instance namespace
    pub namespace: String,
    /// Transition kind
    pub event_type: EventType,
    /// Status before the transition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_status: Option<InstanceStatus>,
    /// Status after the transition
    pub to_status: InstanceStatus,
    /// Human readable description
    pub message: String,
    /// Optional extra detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// When the transition was observed
    pub timestamp: DateTime<Utc>,
}

impl ServiceLogEvent {
    /// `from_status` as stored text, `""` for a first observation
    pub fn from_status_str(&self) -> &str {
        self.from_status
            .as_ref()
            .map(InstanceStatus::as_str)
            .unwrap_or("")
    }
}

/// Last known status of one instance
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusCacheEntry {
    /// Instance name
    pub instance_name: String,
    /// Instance namespace
    pub namespace: String,
    /// Status recorded by the most recent transition
    pub status: InstanceStatus,
    /// When it was written
    pub updated_at: DateTime<Utc>,
}
