//! Tracing setup
//!
//! `CADENCE_LOG_FORMAT=json` switches to JSON lines (production), anything
//! else gets the pretty formatter. `RUST_LOG` overrides the default filter.
//!
//! With the `telemetry` feature and `OTEL_EXPORTER_OTLP_ENDPOINT` set, spans
//! are also exported over OTLP.

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_FILTER: &str = "cadence=info";
const LOG_FORMAT_ENV: &str = "CADENCE_LOG_FORMAT";
const OTLP_ENDPOINT_ENV: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

/// Flushes exported spans on drop
pub struct TelemetryGuard {
    #[cfg(feature = "telemetry")]
    provider: Option<opentelemetry_sdk::trace::TracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        #[cfg(feature = "telemetry")]
        if let Some(provider) = self.provider.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("Failed to flush OpenTelemetry spans: {}", e);
            }
        }
    }
}

/// Install the global subscriber. Call once, before anything logs.
pub fn init_tracing() -> Result<TelemetryGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))?;

    let fmt_layer = match std::env::var(LOG_FORMAT_ENV).as_deref() {
        Ok("json") => fmt::layer().json().boxed(),
        _ => fmt::layer().pretty().boxed(),
    };

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    #[cfg(feature = "telemetry")]
    {
        let provider = otlp::build_provider()?;
        let otel_layer = provider.as_ref().map(otlp::layer);
        registry.with(otel_layer).try_init()?;

        if provider.is_some() {
            tracing::info!("OpenTelemetry export enabled");
        }
        Ok(TelemetryGuard { provider })
    }

    #[cfg(not(feature = "telemetry"))]
    {
        registry.try_init()?;

        if std::env::var(OTLP_ENDPOINT_ENV).is_ok() {
            tracing::warn!("OpenTelemetry endpoint set but feature 'telemetry' not enabled");
            tracing::warn!("Rebuild with: cargo build --features telemetry");
        }
        Ok(TelemetryGuard {})
    }
}

#[cfg(feature = "telemetry")]
mod otlp {
    use super::OTLP_ENDPOINT_ENV;
    use anyhow::Result;
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::trace::TracerProvider;
    use opentelemetry_sdk::{runtime, Resource};
    use tracing_opentelemetry::OpenTelemetryLayer;

    const DEFAULT_SERVICE_NAME: &str = "cadence";

    /// None when no OTLP endpoint is configured
    pub(super) fn build_provider() -> Result<Option<TracerProvider>> {
        let endpoint = match std::env::var(OTLP_ENDPOINT_ENV) {
            Ok(endpoint) => endpoint,
            Err(_) => return Ok(None),
        };
        let service_name = std::env::var("OTEL_SERVICE_NAME")
            .unwrap_or_else(|_| DEFAULT_SERVICE_NAME.to_string());

        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()?;

        let provider = TracerProvider::builder()
            .with_batch_exporter(exporter, runtime::Tokio)
            .with_resource(Resource::new(vec![KeyValue::new(
                "service.name",
                service_name,
            )]))
            .build();

        opentelemetry::global::set_tracer_provider(provider.clone());
        Ok(Some(provider))
    }

    pub(super) fn layer<S>(
        provider: &TracerProvider,
    ) -> OpenTelemetryLayer<S, opentelemetry_sdk::trace::Tracer>
    where
        S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
    {
        tracing_opentelemetry::layer().with_tracer(provider.tracer(DEFAULT_SERVICE_NAME))
    }
}
