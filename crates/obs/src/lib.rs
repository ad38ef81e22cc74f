//! Tracing bootstrap for the board services.
//!
//! Always installs a fmt layer filtered by `RUST_LOG`. When an OTLP
//! endpoint is configured, spans are additionally exported over
//! HTTP/protobuf.

use anyhow::{anyhow, Result};
use once_cell::sync::OnceCell;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::{Protocol, SpanExporter, WithExportConfig};
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INSTALLED: OnceCell<()> = OnceCell::new();

const DEFAULT_FILTER: &str = "info,tower_http=warn,sqlx=warn";

/// How the process reports itself to collectors.
#[derive(Clone, Debug)]
pub struct ObsConfig {
    pub service_name: &'static str,
    pub env_filter: Option<String>,
    pub otlp_endpoint: Option<String>,
}

impl ObsConfig {
    pub fn for_service(service_name: &'static str) -> Self {
        Self {
            service_name,
            env_filter: None,
            otlp_endpoint: std::env::var("OTLP_ENDPOINT").ok(),
        }
    }
}

impl Default for ObsConfig {
    fn default() -> Self {
        Self::for_service("board-server")
    }
}

/// Install the global tracing subscriber. Safe to call more than once;
/// subsequent calls are no-ops.
pub fn init_tracing(config: ObsConfig) -> Result<()> {
    if INSTALLED.get().is_some() {
        return Ok(());
    }

    let filter = config
        .env_filter
        .clone()
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string());

    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_new(filter)?)
        .with(tracing_subscriber::fmt::layer().with_target(false));

    match config.otlp_endpoint.as_deref() {
        Some(endpoint) => registry.with(otlp_layer(config.service_name, endpoint)?).try_init()?,
        None => registry.try_init()?,
    }

    INSTALLED
        .set(())
        .map_err(|_| anyhow!("tracing already initialized"))?;
    Ok(())
}

fn otlp_layer<S>(service_name: &'static str, endpoint: &str) -> Result<OpenTelemetryLayer<S, opentelemetry_sdk::trace::Tracer>>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    let exporter = SpanExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(endpoint)
        .build()?;

    let provider = SdkTracerProvider::builder()
        .with_resource(Resource::builder().with_service_name(service_name).build())
        .with_batch_exporter(exporter)
        .build();

    Ok(tracing_opentelemetry::layer().with_tracer(provider.tracer(service_name)))
}
