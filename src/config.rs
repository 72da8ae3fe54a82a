//! Process configuration
//!
//! Every flag can also be set through the environment variable named next
//! to it. The parsed [`Config`] is converted into the per-component configs
//! and passed by value into constructors.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use failover_common::telemetry::TelemetryConfig;
use failover_common::InstanceKind;
use failover_status::engine::{DEFAULT_REQUEST_TIMEOUT, DEFAULT_SYNC_INTERVAL};
use failover_status::EngineConfig;

/// Status reconciler for Redis failover instances
#[derive(Parser, Debug, Clone)]
#[command(name = "failover", version, about, long_about = None)]
pub struct Config {
    /// Path to a kubeconfig; in-cluster config is used when unset
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Address of the health server
    #[arg(long, env = "FAILOVER_HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    pub health_addr: SocketAddr,

    /// Seconds between full sync passes
    #[arg(long, env = "FAILOVER_SYNC_INTERVAL_SECS", default_value_t = DEFAULT_SYNC_INTERVAL.as_secs())]
    pub sync_interval_secs: u64,

    /// Deadline in seconds for list, get and watch-open calls
    #[arg(long, env = "FAILOVER_REQUEST_TIMEOUT_SECS", default_value_t = DEFAULT_REQUEST_TIMEOUT.as_secs())]
    pub request_timeout_secs: u64,

    /// OTLP collector endpoint (e.g. http://otel-collector:4317)
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    /// Print a sample instance manifest and exit
    #[arg(long)]
    pub print_instance: bool,
}

impl Config {
    /// Engine timings; backoff bounds keep their defaults
    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            sync_interval: Duration::from_secs(self.sync_interval_secs.max(1)),
            request_timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
            ..Default::default()
        }
    }

    /// Instance resource coordinates
    pub fn instance_kind(&self) -> InstanceKind {
        InstanceKind::default()
    }

    /// Telemetry settings
    pub fn telemetry(&self) -> TelemetryConfig {
        TelemetryConfig {
            otlp_endpoint: self.otlp_endpoint.clone().filter(|e| !e.is_empty()),
            ..Default::default()
        }
    }
}
