//! Instance status vocabulary
//!
//! Statuses are an open vocabulary: the canonical values are `Running`,
//! `Provisioning`, `Failed` and `Unknown`, but tokens reported by the
//! instance resource that have no known synonym are carried through as
//! [`InstanceStatus::Other`] so new phase names are never lost.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Resolved status of an instance
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum InstanceStatus {
    /// All replicas ready
    Running,
    /// Being created, scaled or recovering
    Provisioning,
    /// Reported failed or degraded
    Failed,
    /// Nothing known yet
    Unknown,
    /// Any other token, kept verbatim
    Other(String),
}

impl InstanceStatus {
    /// Canonical string form
    pub fn as_str(&self) -> &str {
        match self {
            Self::Running => "Running",
            Self::Provisioning => "Provisioning",
            Self::Failed => "Failed",
            Self::Unknown => "Unknown",
            Self::Other(token) => token,
        }
    }

    /// Parse a stored status string. Exact canonical names map to their
    /// variant; everything else is kept as [`InstanceStatus::Other`].
    pub fn parse(token: &str) -> Self {
        match token {
            "Running" => Self::Running,
            "Provisioning" => Self::Provisioning,
            "Failed" => Self::Failed,
            "Unknown" => Self::Unknown,
            other => Self::Other(other.to_string()),
        }
    }

    /// Whether this is the `Failed` status
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for InstanceStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for InstanceStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let token = String::deserialize(deserializer)?;
        Ok(Self::parse(&token))
    }
}
