use anyhow::{Context, Error, Result};
use once_cell::sync::OnceCell;
use opentelemetry::{KeyValue, global, trace::TracerProvider};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource,
    trace::{RandomIdGenerator, Sampler, SdkTracer, SdkTracerProvider},
};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// Initializes the tracing subscriber exactly once.
///
/// Uses a JSON fmt layer filtered by `RUST_LOG` (default `info`). OTLP export
/// is wired up separately via `init_tracer` once the exporter version matches
/// the rest of the opentelemetry stack.
///
/// # Errors
/// Returns an error if the subscriber has already been installed by another library.
pub fn init() -> Result<()> {
    TRACING_INIT.get_or_try_init(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let fmt_layer = tracing_subscriber::fmt::layer().with_target(false).json();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|error| Error::msg(error.to_string()))?;

        info!("standard tracing initialized");

        Ok::<(), Error>(())
    })?;
    Ok(())
}

/// Initializes an OpenTelemetry tracer exporting via OTLP.
///
/// Sampling ratio is controlled by `OTEL_SAMPLING_RATIO` (default 1.0 = sample everything).
///
/// # Errors
/// Returns an error if the exporter cannot be built.
#[allow(dead_code)]
fn init_tracer(endpoint: &str) -> Result<SdkTracer> {
    let sampling_ratio = std::env::var("OTEL_SAMPLING_RATIO")
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(1.0);

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .context("failed to build OTLP span exporter")?;

    let resource = Resource::builder()
        .with_attributes([
            KeyValue::new("service.name", "company-research-pipeline"),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
        ])
        .build();

    let tracer_provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_sampler(Sampler::TraceIdRatioBased(sampling_ratio))
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource)
        .build();

    let tracer = tracer_provider.tracer("company-research-pipeline");

    global::set_tracer_provider(tracer_provider);

    Ok(tracer)
}

/// Shuts down the global OpenTelemetry tracer provider, flushing pending spans.
///
/// Call this on application exit.
#[allow(dead_code)]
pub fn shutdown() {
    // The 0.31 SDK doesn't expose a way to recover the SdkTracerProvider from
    // the global tracer, so callers that need a clean shutdown should hold on
    // to the provider returned by `init_tracer` and shut it down directly.
}
