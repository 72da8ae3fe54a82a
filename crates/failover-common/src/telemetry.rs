//! Process-wide logging and OpenTelemetry export
//!
//! Logs are always written as JSON lines to stdout. When a collector endpoint
//! is configured, spans and the instruments in [`crate::metrics`] are also
//! shipped over OTLP/gRPC, tagged with the pod identity taken from the
//! downward API.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{Tracer, TracerProvider};
use opentelemetry_sdk::{runtime, Resource};
use opentelemetry_semantic_conventions::resource::{SERVICE_NAME, SERVICE_VERSION};
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "info,failover=debug,kube=info,tower=warn,hyper=warn";

/// Downward API variables and the resource attribute each one fills
const POD_IDENTITY: &[(&str, &str)] = &[
    ("POD_NAME", "k8s.pod.name"),
    ("POD_NAMESPACE", "k8s.namespace.name"),
    ("NODE_NAME", "k8s.node.name"),
];

/// Telemetry setup failure
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// An OTLP exporter could not be built
    #[error("failed to build OTLP {signal} exporter for {endpoint}: {message}")]
    Exporter {
        /// "span" or "metric"
        signal: &'static str,
        /// Collector endpoint
        endpoint: String,
        /// Exporter error
        message: String,
    },

    /// A global subscriber was already installed
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(String),
}

/// Telemetry settings
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// `service.name` on exported spans and metrics
    pub service_name: String,

    /// OTLP collector, e.g. `http://otel-collector:4317`. Logs only when unset.
    pub otlp_endpoint: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "failover".to_string(),
            otlp_endpoint: None,
        }
    }
}

/// Install the global subscriber, propagator and (optionally) OTLP providers.
///
/// Call once at startup before spawning tasks.
pub fn init_telemetry(config: TelemetryConfig) -> Result<(), TelemetryError> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    let tracer = match &config.otlp_endpoint {
        Some(endpoint) => {
            let export = OtlpExport::new(endpoint, &config.service_name);
            export.install_meter_provider()?;
            Some(export.install_tracer_provider(&config.service_name)?)
        }
        None => None,
    };

    let json_logs = tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(false)
        .with_target(true)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(log_filter())
        .with(json_logs)
        .with(tracer.map(|t| tracing_opentelemetry::layer().with_tracer(t)))
        .try_init()
        .map_err(|e| TelemetryError::Subscriber(e.to_string()))
}

/// `RUST_LOG` when it parses, [`DEFAULT_LOG_FILTER`] otherwise
fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Attributes describing this process. `lookup` resolves environment
/// variables; unset ones are left out.
fn resource_attributes(
    service_name: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Vec<KeyValue> {
    let identity = POD_IDENTITY
        .iter()
        .filter_map(|(var, key)| lookup(var).map(|value| KeyValue::new(*key, value)));

    std::iter::once(KeyValue::new(SERVICE_NAME, service_name.to_string()))
        .chain(std::iter::once(KeyValue::new(
            SERVICE_VERSION,
            env!("CARGO_PKG_VERSION"),
        )))
        .chain(identity)
        .collect()
}

/// OTLP/gRPC export to one collector, sharing a resource across signals
struct OtlpExport {
    endpoint: String,
    resource: Resource,
}

impl OtlpExport {
    fn new(endpoint: &str, service_name: &str) -> Self {
        let attributes = resource_attributes(service_name, |var| std::env::var(var).ok());
        Self {
            endpoint: endpoint.to_string(),
            resource: Resource::new(attributes),
        }
    }

    fn exporter_error(&self, signal: &'static str, err: impl std::fmt::Display) -> TelemetryError {
        TelemetryError::Exporter {
            signal,
            endpoint: self.endpoint.clone(),
            message: err.to_string(),
        }
    }

    /// Route the global meter (and so every instrument) to the collector
    fn install_meter_provider(&self) -> Result<(), TelemetryError> {
        let exporter = opentelemetry_otlp::MetricExporter::builder()
            .with_tonic()
            .with_endpoint(self.endpoint.as_str())
            .build()
            .map_err(|e| self.exporter_error("metric", e))?;

        let provider = SdkMeterProvider::builder()
            .with_reader(PeriodicReader::builder(exporter, runtime::Tokio).build())
            .with_resource(self.resource.clone())
            .build();
        global::set_meter_provider(provider);
        Ok(())
    }

    /// Batch spans to the collector and return a tracer for the bridge layer
    fn install_tracer_provider(&self, service_name: &str) -> Result<Tracer, TelemetryError> {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(self.endpoint.as_str())
            .build()
            .map_err(|e| self.exporter_error("span", e))?;

        let provider = TracerProvider::builder()
            .with_batch_exporter(exporter, runtime::Tokio)
            .with_resource(self.resource.clone())
            .build();
        let tracer = provider.tracer(service_name.to_string());
        global::set_tracer_provider(provider);
        Ok(tracer)
    }
}
