//! Common types for the failover reconciler: errors, documents, resource
//! conventions and telemetry

#![deny(missing_docs)]

pub mod document;
pub mod error;
pub mod kinds;
pub mod kube_utils;
pub mod metrics;
pub mod status;
pub mod telemetry;

pub use document::{Document, DocumentList, PathLookup};
pub use error::Error;
pub use kinds::{InstanceKind, ResourceKind, WorkloadRole};
pub use status::InstanceStatus;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Namespaces that always exist and are never created on behalf of a tenant
pub const SYSTEM_NAMESPACES: [&str; 3] = ["default", "kube-system", "kube-public"];

/// Namespace used when a request does not name one
pub const DEFAULT_NAMESPACE: &str = "default";
