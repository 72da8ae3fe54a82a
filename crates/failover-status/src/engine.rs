//! Reconciliation engine
//!
//! Two long-lived tasks observe instances and feed every snapshot through
//! transition detection:
//!
//! - the watch loop lists instances to obtain a resource version, opens a
//!   watch from it and processes Added/Modified events until the stream
//!   ends, reconnecting with exponential backoff after failures;
//! - the sync loop re-lists every instance on a fixed interval regardless of
//!   the watch loop's state.
//!
//! Both loops share the status cache and service log and stop on the same
//! cancellation token. When cluster-wide listing is forbidden, listing falls
//! back to one call per namespace.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use failover_common::metrics::{self, LoopKind, RestartReason, SyncTimer};
use failover_common::{Document, DocumentList, Error, InstanceKind, ResourceKind, Result};
use failover_store::{ServiceLogSink, StatusCache};

use crate::backoff::Backoff;
use crate::client::{with_deadline, ListScope, ResourceClient, WatchEvent};
use crate::instance::{LiveStatus, ManagedInstance};
use crate::transition::{detect_transition, InstanceRef};

/// Initial delay before reconnecting a failed watch
pub const DEFAULT_WATCH_BACKOFF_INITIAL: Duration = Duration::from_millis(500);
/// Upper bound on the reconnect delay
pub const DEFAULT_WATCH_BACKOFF_MAX: Duration = Duration::from_secs(30);
/// Interval between full sync passes
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);
/// Deadline for list, get and watch-open calls
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Timing knobs for the engine
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// First reconnect delay after a failed watch session
    pub watch_backoff_initial: Duration,
    /// Reconnect delay cap
    pub watch_backoff_max: Duration,
    /// Period of the full sync pass
    pub sync_interval: Duration,
    /// Deadline applied to each list/get/watch-open call
    pub request_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            watch_backoff_initial: DEFAULT_WATCH_BACKOFF_INITIAL,
            watch_backoff_max: DEFAULT_WATCH_BACKOFF_MAX,
            sync_interval: DEFAULT_SYNC_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Counts from one full sync pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Instances listed
    pub instances: usize,
    /// Events written
    pub written: usize,
    /// Instances whose processing failed
    pub failed: usize,
}

/// How a watch session ended without error
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// The server closed the stream
    Closed,
    /// Shutdown was requested
    Cancelled,
}

/// Watch and sync loops over the instance custom resource
#[derive(Clone)]
pub struct Engine {
    client: Arc<dyn ResourceClient>,
    cache: Arc<dyn StatusCache>,
    log: Arc<dyn ServiceLogSink>,
    kind: InstanceKind,
    config: EngineConfig,
}

impl Engine {
    /// Create an engine over the given collaborators
    pub fn new(
        client: Arc<dyn ResourceClient>,
        cache: Arc<dyn StatusCache>,
        log: Arc<dyn ServiceLogSink>,
        kind: InstanceKind,
        config: EngineConfig,
    ) -> Self {
        Self {
            client,
            cache,
            log,
            kind,
            config,
        }
    }

    /// Engine timing configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// List every instance, falling back to per-namespace listing when the
    /// cluster-wide list is forbidden.
    ///
    /// Namespaces that fail to list are skipped. The fallback result carries
    /// no resource version.
    pub async fn list_instances(&self, loop_kind: LoopKind) -> Result<DocumentList> {
        let timeout = self.config.request_timeout;
        let cluster_wide = with_deadline(
            timeout,
            "list instances",
            self.client.list(ResourceKind::Instance, &ListScope::All),
        )
        .await;

        match cluster_wide {
            Ok(list) => Ok(list),
            Err(e) if e.is_forbidden() => {
                metrics::record_forbidden_fallback(loop_kind);
                debug!(
                    loop_kind = loop_kind.as_str(),
                    error = %e,
                    "cluster-wide list forbidden, listing per namespace"
                );
                let list = self.list_per_namespace().await?;
                info!(
                    loop_kind = loop_kind.as_str(),
                    instances = list.len(),
                    "using per-namespace list"
                );
                Ok(list)
            }
            Err(e) => Err(e),
        }
    }

    async fn list_per_namespace(&self) -> Result<DocumentList> {
        let timeout = self.config.request_timeout;
        let namespaces = with_deadline(
            timeout,
            "list namespaces",
            self.client.list_namespace_names(),
        )
        .await?;

        let mut items = Vec::new();
        for namespace in namespaces {
            let scope = ListScope::Namespace(namespace);
            match with_deadline(
                timeout,
                "list instances",
                self.client.list(ResourceKind::Instance, &scope),
            )
            .await
            {
                Ok(list) => items.extend(list.items),
                Err(e) => debug!(scope = ?scope, error = %e, "skipping namespace"),
            }
        }
        Ok(DocumentList::new(items, None))
    }

    /// Resolve one instance snapshot and record a transition if its status
    /// changed. Returns whether an event was written.
    pub async fn reconcile_instance(&self, doc: &Document) -> Result<bool> {
        let instance = ManagedInstance::from_document(doc, &self.kind)?;
        let live = LiveStatus::observe(
            self.client.as_ref(),
            &self.kind,
            &instance,
            self.config.request_timeout,
        )
        .await?;
        let current = live.resolve(&instance.status);

        detect_transition(
            self.cache.as_ref(),
            self.log.as_ref(),
            InstanceRef {
                name: &instance.name,
                namespace: &instance.namespace,
            },
            &current,
        )
        .await
    }

    /// One full pass over every instance.
    ///
    /// Fails only if instances cannot be listed at all; per-instance errors
    /// are logged and counted.
    #[instrument(skip(self))]
    pub async fn run_sync_once(&self) -> Result<PassSummary> {
        let timer = SyncTimer::start();
        let list = self.list_instances(LoopKind::Sync).await?;

        let mut summary = PassSummary {
            instances: list.len(),
            ..Default::default()
        };
        for doc in &list.items {
            match self.reconcile_instance(doc).await {
                Ok(true) => summary.written += 1,
                Ok(false) => {}
                Err(e) => {
                    summary.failed += 1;
                    metrics::record_item_error(LoopKind::Sync);
                    warn!(
                        instance = doc.name().unwrap_or_default(),
                        namespace = doc.namespace().unwrap_or_default(),
                        error = %e,
                        "sync failed to process instance"
                    );
                }
            }
        }
        timer.complete();

        if summary.instances > 0 || summary.written > 0 {
            info!(
                instances = summary.instances,
                written = summary.written,
                failed = summary.failed,
                "sync complete"
            );
        }
        Ok(summary)
    }

    /// One watch session: list, open a watch from the list's resource
    /// version and process events until the stream ends or `cancel` fires.
    ///
    /// The stream is dropped, closing the connection, before returning.
    pub async fn run_watch_once(&self, cancel: &CancellationToken) -> Result<SessionEnd> {
        let list = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(SessionEnd::Cancelled),
            list = self.list_instances(LoopKind::Watch) => list?,
        };
        let resource_version = list.watch_version().to_string();

        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(SessionEnd::Cancelled),
            stream = with_deadline(
                self.config.request_timeout,
                "open watch",
                self.client.watch(ResourceKind::Instance, &resource_version),
            ) => stream?,
        };
        info!(resource_version = %resource_version, "watching instances");

        let mut written = 0usize;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(written, "watch cancelled");
                    return Ok(SessionEnd::Cancelled);
                }
                next = stream.next() => next,
            };

            let doc = match next {
                None => {
                    debug!(written, "watch stream closed");
                    return Ok(SessionEnd::Closed);
                }
                Some(Ok(WatchEvent::Added(doc) | WatchEvent::Modified(doc))) => doc,
                Some(Ok(WatchEvent::Deleted(_))) => continue,
                Some(Err(e @ Error::Malformed { .. })) => {
                    warn!(error = %e, "skipping malformed watch event");
                    continue;
                }
                Some(Err(e)) => return Err(e),
            };

            match self.reconcile_instance(&doc).await {
                Ok(true) => written += 1,
                Ok(false) => {}
                Err(e) => {
                    metrics::record_item_error(LoopKind::Watch);
                    warn!(
                        instance = doc.name().unwrap_or_default(),
                        namespace = doc.namespace().unwrap_or_default(),
                        error = %e,
                        "watch failed to process instance"
                    );
                }
            }
        }
    }

    /// Run watch sessions until `cancel` fires.
    ///
    /// A session that closes cleanly restarts immediately with the backoff
    /// reset; a failed session waits out the backoff first.
    pub async fn run_watch_loop(&self, cancel: CancellationToken) {
        let mut backoff = Backoff::new(
            self.config.watch_backoff_initial,
            self.config.watch_backoff_max,
        );

        loop {
            if cancel.is_cancelled() {
                return;
            }
            match self.run_watch_once(&cancel).await {
                Ok(SessionEnd::Cancelled) => return,
                Ok(SessionEnd::Closed) => {
                    metrics::record_watch_restart(RestartReason::Closed);
                    backoff.reset();
                }
                Err(e) => {
                    metrics::record_watch_restart(RestartReason::Error);
                    let delay = backoff.next_delay();
                    warn!(
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "watch ended, reconnecting"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Run a sync pass every `sync_interval` until `cancel` fires.
    ///
    /// The first pass happens one interval after the call.
    pub async fn run_sync_loop(&self, cancel: CancellationToken) {
        let period = self.config.sync_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    if let Err(e) = self.run_sync_once().await {
                        error!(error = %e, "sync failed to list instances");
                    }
                }
            }
        }
    }

    /// Warm the cache with one synchronous pass, then start both loops.
    ///
    /// A failed warm-up pass is logged; the loops start regardless.
    pub async fn start(self, cancel: CancellationToken) -> EngineHandle {
        match self.run_sync_once().await {
            Ok(summary) => info!(
                instances = summary.instances,
                written = summary.written,
                "initial sync finished"
            ),
            Err(e) => error!(error = %e, "initial sync failed to list instances"),
        }

        let watch = {
            let engine = self.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { engine.run_watch_loop(cancel).await })
        };
        let sync = tokio::spawn(async move { self.run_sync_loop(cancel).await });

        EngineHandle { watch, sync }
    }
}

/// Join handles of the two background loops
pub struct EngineHandle {
    watch: JoinHandle<()>,
    sync: JoinHandle<()>,
}

impl EngineHandle {
    /// Wait for both loops to exit
    pub async fn join(self) {
        let (watch, sync) = tokio::join!(self.watch, self.sync);
        if let Err(e) = watch {
            error!(error = %e, "watch loop panicked");
        }
        if let Err(e) = sync {
            error!(error = %e, "sync loop panicked");
        }
    }
}
