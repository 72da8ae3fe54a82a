//! Metrics registry for reconciler observability
//!
//! Provides OpenTelemetry metrics for:
//! - Status transitions written to the service log
//! - Watch session restarts
//! - Periodic sync pass duration
//! - Forbidden-fallback listing and per-item failures

use once_cell::sync::Lazy;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::KeyValue;

/// Global meter for failover metrics
static METER: Lazy<Meter> = Lazy::new(|| global::meter("failover"));

/// Counter of transitions recorded
///
/// Labels:
/// - `event_type`: status_change, failure
pub static TRANSITIONS_TOTAL: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("failover_transitions_total")
        .with_description("Total number of instance status transitions recorded")
        .with_unit("{transitions}")
        .build()
});

/// Counter of watch session restarts
///
/// Labels:
/// - `reason`: closed, error
pub static WATCH_RESTARTS_TOTAL: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("failover_watch_restarts_total")
        .with_description("Total number of watch session restarts")
        .with_unit("{restarts}")
        .build()
});

/// Histogram of full sync pass duration
pub static SYNC_DURATION: Lazy<Histogram<f64>> = Lazy::new(|| {
    METER
        .f64_histogram("failover_sync_duration_seconds")
        .with_description("Duration of full status sync passes in seconds")
        .with_unit("s")
        .build()
});

/// Counter of listings that fell back to per-namespace enumeration
///
/// Labels:
/// - `loop`: watch, sync
pub static FORBIDDEN_FALLBACK_TOTAL: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("failover_forbidden_fallback_total")
        .with_description("Cluster-wide listings denied and retried per namespace")
        .with_unit("{listings}")
        .build()
});

/// Counter of instances whose processing was aborted
///
/// Labels:
/// - `loop`: watch, sync
pub static ITEM_ERRORS_TOTAL: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("failover_item_errors_total")
        .with_description("Instances whose status processing failed")
        .with_unit("{errors}")
        .build()
});

/// Which observation loop produced a measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    /// The watch loop
    Watch,
    /// The periodic sync loop
    Sync,
}

impl LoopKind {
    /// Convert to label value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Watch => "watch",
            Self::Sync => "sync",
        }
    }
}

/// Why a watch session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    /// Stream closed by the server
    Closed,
    /// List, watch-open or stream error
    Error,
}

impl RestartReason {
    /// Convert to label value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Error => "error",
        }
    }
}

/// Record a transition written to the service log
pub fn record_transition(event_type: &str) {
    TRANSITIONS_TOTAL.add(1, &[KeyValue::new("event_type", event_type.to_string())]);
}

/// Record a watch session restart
pub fn record_watch_restart(reason: RestartReason) {
    WATCH_RESTARTS_TOTAL.add(1, &[KeyValue::new("reason", reason.as_str())]);
}

/// Record a per-namespace fallback listing
pub fn record_forbidden_fallback(loop_kind: LoopKind) {
    FORBIDDEN_FALLBACK_TOTAL.add(1, &[KeyValue::new("loop", loop_kind.as_str())]);
}

/// Record an instance whose processing was aborted
pub fn record_item_error(loop_kind: LoopKind) {
    ITEM_ERRORS_TOTAL.add(1, &[KeyValue::new("loop", loop_kind.as_str())]);
}

/// Times a sync pass
pub struct SyncTimer {
    start: std::time::Instant,
}

impl SyncTimer {
    /// Start timing a sync pass
    pub fn start() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    /// Record completion
    pub fn complete(self) {
        SYNC_DURATION.record(self.start.elapsed().as_secs_f64(), &[]);
    }
}
