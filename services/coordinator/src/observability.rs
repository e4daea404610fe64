//! Logging, trace propagation and the Prometheus scrape endpoint.
//!
//! # Purpose
//! Installs the process-wide `tracing` subscriber (env filter, fmt output and,
//! when `OTEL_EXPORTER_OTLP_ENDPOINT` is set, an OTLP span exporter), the
//! `metrics` recorder, and descriptions for the coordinator's counters.
//!
//! # Key invariants
//! - Setup runs once per process; later calls return the same handle.
//! - Inbound `traceparent` headers become the parent of request spans.
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::propagation::Extractor;
use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Once, OnceLock};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub const AUTHZ_DECISIONS: &str = "loop_authz_decisions_total";
pub const MEMBERSHIP_TRANSITIONS: &str = "loop_membership_transitions_total";
pub const CREDENTIALS: &str = "loop_credentials_total";

static RECORDER: OnceLock<Option<PrometheusHandle>> = OnceLock::new();
static SUBSCRIBER: Once = Once::new();
static PROPAGATOR: Once = Once::new();

/// Sets up logging, tracing and metrics for `service_name`.
///
/// `None` means some other metrics recorder already owns this process.
pub fn init_observability(service_name: &str) -> Option<PrometheusHandle> {
    SUBSCRIBER.call_once(|| install_subscriber(service_name));
    RECORDER
        .get_or_init(|| {
            let handle = match PrometheusBuilder::new().install_recorder() {
                Ok(handle) => handle,
                Err(err) => {
                    tracing::warn!(error = %err, "prometheus recorder unavailable");
                    return None;
                }
            };
            describe_counters();
            Some(handle)
        })
        .clone()
}

fn install_subscriber(service_name: &str) {
    ensure_propagator();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let base = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false));
    let installed = match otlp_provider(service_name) {
        Some(provider) => {
            let tracer = provider.tracer(service_name.to_string());
            base.with(tracing_opentelemetry::layer().with_tracer(tracer))
                .try_init()
        }
        None => base.try_init(),
    };
    // A test harness may have installed its own subscriber first.
    if installed.is_err() {
        tracing::debug!("global subscriber already set");
    }
}

fn describe_counters() {
    metrics::describe_counter!(
        AUTHZ_DECISIONS,
        "Authorization decisions by required level and outcome"
    );
    metrics::describe_counter!(
        MEMBERSHIP_TRANSITIONS,
        "Membership store operations by op and outcome"
    );
    metrics::describe_counter!(
        CREDENTIALS,
        "One-time code and session operations by op and outcome"
    );
}

fn ensure_propagator() {
    PROPAGATOR.call_once(|| global::set_text_map_propagator(TraceContextPropagator::new()));
}

fn otlp_provider(service_name: &str) -> Option<SdkTracerProvider> {
    std::env::var_os("OTEL_EXPORTER_OTLP_ENDPOINT")?;
    let exporter = match opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .build()
    {
        Ok(exporter) => exporter,
        Err(err) => {
            eprintln!("otlp exporter disabled: {err}");
            return None;
        }
    };
    Some(
        SdkTracerProvider::builder()
            .with_batch_exporter(exporter)
            .with_resource(
                Resource::builder_empty()
                    .with_attributes(service_resource(service_name))
                    .build(),
            )
            .build(),
    )
}

fn service_resource(service_name: &str) -> Vec<KeyValue> {
    let instance = std::env::var("LOOP_SERVICE_INSTANCE_ID")
        .or_else(|_| std::env::var("HOSTNAME"))
        .ok();
    let mut attributes = vec![
        KeyValue::new("service.name", service_name.to_string()),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
    ];
    if let Some(instance) = instance {
        attributes.push(KeyValue::new("service.instance.id", instance));
    }
    attributes
}

/// Parent context carried by W3C trace headers, or an empty context.
pub fn trace_context_from_headers(headers: &axum::http::HeaderMap) -> opentelemetry::Context {
    ensure_propagator();
    global::get_text_map_propagator(|propagator| propagator.extract(&TraceHeaders(headers)))
}

struct TraceHeaders<'a>(&'a axum::http::HeaderMap);

impl Extractor for TraceHeaders<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key)?.to_str().ok()
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(axum::http::HeaderName::as_str).collect()
    }
}

/// Serves `GET /metrics` on `addr` until the process exits.
pub async fn serve_metrics(handle: PrometheusHandle, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "metrics endpoint listening");
    serve_metrics_until(handle, listener, std::future::pending()).await
}

fn metrics_router(handle: PrometheusHandle) -> axum::Router {
    axum::Router::new().route(
        "/metrics",
        axum::routing::get(move || std::future::ready(handle.render())),
    )
}

async fn serve_metrics_until<F>(
    handle: PrometheusHandle,
    listener: tokio::net::TcpListener,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, metrics_router(handle))
        .with_graceful_shutdown(shutdown)
        .await
}
