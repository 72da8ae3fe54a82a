//! In-process store backing the status cache and the service log
//!
//! Upserts and appends are atomic per call, which is all the reconciler
//! relies on. Contents are lost on restart; the first sync pass after a
//! restart records every instance as first seen again.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::trace;

use failover_common::{InstanceStatus, Result};

use crate::models::{ServiceLogEvent, StatusCacheEntry};
use crate::query::{Page, ServiceLogQuery};
use crate::{ServiceLogReader, ServiceLogSink, StatusCache};

type InstanceKey = (String, String);

/// Status cache and service log held in memory
#[derive(Default)]
pub struct MemoryStore {
    cache: DashMap<InstanceKey, StatusCacheEntry>,
    events: RwLock<Vec<ServiceLogEvent>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Full cache entry for an instance, including its update time
    pub fn entry(&self, name: &str, namespace: &str) -> Option<StatusCacheEntry> {
        self.cache
            .get(&(name.to_string(), namespace.to_string()))
            .map(|e| e.value().clone())
    }

    /// Every event recorded for an instance, oldest first
    pub fn events_for(&self, name: &str, namespace: &str) -> Vec<ServiceLogEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.instance_name == name && e.namespace == namespace)
            .cloned()
            .collect()
    }

    /// Number of events recorded across all instances
    pub fn event_count(&self) -> usize {
        self.events.read().len()
    }

    /// Number of instances with a cache entry
    pub fn cached_instances(&self) -> usize {
        self.cache.len()
    }
}

#[async_trait]
impl StatusCache for MemoryStore {
    async fn get(&self, name: &str, namespace: &str) -> Result<Option<InstanceStatus>> {
        Ok(self.entry(name, namespace).map(|e| e.status))
    }

    async fn set(&self, name: &str, namespace: &str, status: &InstanceStatus) -> Result<()> {
        trace!(instance = %name, namespace = %namespace, status = %status, "caching status");
        self.cache.insert(
            (name.to_string(), namespace.to_string()),
            StatusCacheEntry {
                instance_name: name.to_string(),
                namespace: namespace.to_string(),
                status: status.clone(),
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }
}

#[async_trait]
impl ServiceLogSink for MemoryStore {
    async fn insert(&self, event: &ServiceLogEvent) -> Result<()> {
        self.events.write().push(event.clone());
        Ok(())
    }
}

#[async_trait]
impl ServiceLogReader for MemoryStore {
    async fn query(&self, query: &ServiceLogQuery) -> Result<Page<ServiceLogEvent>> {
        if !query.is_satisfiable() {
            return Ok(Page::empty());
        }

        let mut matching: Vec<ServiceLogEvent> = self
            .events
            .read()
            .iter()
            .filter(|e| query.matches(&e.instance_name, &e.namespace))
            .cloned()
            .collect();
        // Stable sort keeps insertion order between equal timestamps, so
        // reversing afterwards yields newest-first with later inserts first.
        matching.sort_by_key(|e| e.timestamp);
        matching.reverse();

        let total = matching.len();
        let items = matching
            .into_iter()
            .skip(query.skip)
            .take(query.effective_limit())
            .collect();

        Ok(Page { items, total })
    }
}
