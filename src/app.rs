//! Process wiring: health server, engine startup and shutdown

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use failover_common::kube_utils::create_client;
use failover_common::{InstanceKind, DEFAULT_NAMESPACE};
use failover_status::{instance_manifest, Engine, KubeResourceClient};
use failover_store::MemoryStore;

use crate::config::Config;

/// Set once the startup sync pass has completed
#[derive(Clone, Debug, Default)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
    /// Mark the process ready to serve
    pub fn mark_ready(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether the startup pass has completed
    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Liveness and readiness routes
///
/// - GET /healthz - always 200
/// - GET /readyz - 200 once ready, 503 before
pub fn health_router(readiness: Readiness) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readyz))
        .with_state(readiness)
}

async fn readyz(State(readiness): State<Readiness>) -> (StatusCode, &'static str) {
    if readiness.is_ready() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "starting")
    }
}

/// Serve the health routes on `addr` until `cancel` fires
pub async fn serve_health(
    addr: SocketAddr,
    readiness: Readiness,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind health server on {}: {}", addr, e))?;
    info!(addr = %addr, "health server listening");

    axum::serve(listener, health_router(readiness))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| anyhow::anyhow!("Health server error: {}", e))
}

/// Sample instance manifest as YAML
pub fn sample_instance(kind: &InstanceKind) -> anyhow::Result<String> {
    let manifest = instance_manifest(kind, "example", DEFAULT_NAMESPACE, 3, 3)
        .map_err(|e| anyhow::anyhow!("Failed to build instance manifest: {}", e))?;
    serde_yaml::to_string(&manifest)
        .map_err(|e| anyhow::anyhow!("Failed to serialize instance manifest: {}", e))
}

/// Cancel `cancel` on SIGINT or SIGTERM
///
/// The SIGTERM handler is installed before this returns, so a signal sent
/// right after the call is not lost.
pub fn shutdown_on_signal(cancel: CancellationToken) -> anyhow::Result<JoinHandle<()>> {
    let mut terminate = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to install SIGTERM handler: {}", e))?;

    Ok(tokio::spawn(async move {
        let interrupt = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for SIGINT");
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            _ = interrupt => info!("received SIGINT, shutting down"),
            _ = terminate.recv() => info!("received SIGTERM, shutting down"),
            _ = cancel.cancelled() => return,
        }
        cancel.cancel();
    }))
}

/// Drive `work` alongside the health server
///
/// Whichever finishes first cancels the other, so a health server that
/// exits early (e.g. the port is taken) stops the engine too.
pub async fn supervise<F>(
    mut health: JoinHandle<anyhow::Result<()>>,
    work: F,
    cancel: CancellationToken,
) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(work);

    tokio::select! {
        _ = &mut work => {
            cancel.cancel();
            flatten_health(health.await)
        }
        finished = &mut health => {
            let result = flatten_health(finished);
            match &result {
                Ok(()) => warn!("health server stopped before the engine"),
                Err(e) => error!(error = %e, "health server failed, shutting down"),
            }
            cancel.cancel();
            work.await;
            result
        }
    }
}

fn flatten_health(
    joined: Result<anyhow::Result<()>, tokio::task::JoinError>,
) -> anyhow::Result<()> {
    joined.map_err(|e| anyhow::anyhow!("Health server task failed: {}", e))?
}

/// Run the reconciler until `cancel` fires
pub async fn run(config: Config, cancel: CancellationToken) -> anyhow::Result<()> {
    let readiness = Readiness::default();
    let health = tokio::spawn(serve_health(
        config.health_addr,
        readiness.clone(),
        cancel.clone(),
    ));

    let client = create_client(config.kubeconfig.as_deref())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;
    let kind = config.instance_kind();
    let resources = Arc::new(KubeResourceClient::new(client, kind.clone()));
    let store = Arc::new(MemoryStore::new());
    let engine = Engine::new(resources, store.clone(), store, kind, config.engine());

    info!(
        sync_interval_secs = engine.config().sync_interval.as_secs(),
        "starting reconciliation engine"
    );
    let engine_cancel = cancel.clone();
    let work = async move {
        let loops = engine.start(engine_cancel).await;
        readiness.mark_ready();
        loops.join().await;
        info!("reconciliation engine stopped");
    };

    supervise(health, work, cancel).await
}
