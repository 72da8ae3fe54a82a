//! Persistence for the failover reconciler
//!
//! Two collections back status tracking: a per-instance status cache keyed by
//! `(name, namespace)` and an append-only service log of transitions. Both are
//! reached through the traits here so the reconciler never depends on a
//! particular backend.

#![deny(missing_docs)]

pub mod memory;
pub mod models;
pub mod query;

use async_trait::async_trait;

use failover_common::{InstanceStatus, Result};

pub use memory::MemoryStore;
pub use models::{EventType, ServiceLogEvent, StatusCacheEntry};
pub use query::{NamespaceScope, Page, ServiceLogQuery, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};

/// Last known status per instance
#[async_trait]
pub trait StatusCache: Send + Sync {
    /// Cached status, `None` if the instance has never been recorded
    async fn get(&self, name: &str, namespace: &str) -> Result<Option<InstanceStatus>>;

    /// Upsert the cached status, refreshing its update time
    async fn set(&self, name: &str, namespace: &str, status: &InstanceStatus) -> Result<()>;
}

/// Append side of the service log
#[async_trait]
pub trait ServiceLogSink: Send + Sync {
    /// Append one event. Events are never updated or deleted.
    async fn insert(&self, event: &ServiceLogEvent) -> Result<()>;
}

/// Read side of the service log
#[async_trait]
pub trait ServiceLogReader: Send + Sync {
    /// Matching events newest first, with the total match count
    async fn query(&self, query: &ServiceLogQuery) -> Result<Page<ServiceLogEvent>>;
}
