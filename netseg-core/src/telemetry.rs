//! Tracing/OpenTelemetry wiring (SPEC_FULL.md §4.11).

use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    resource::{OsResourceDetector, ProcessResourceDetector},
    trace, Resource,
};
use opentelemetry_semantic_conventions::resource::{DEPLOYMENT_ENVIRONMENT, SERVICE_NAME, SERVICE_VERSION};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::AppConfig;

/// Initializes the global tracing subscriber. When `telemetry.otlp_endpoint`
/// is set an OTLP batch exporter is layered in alongside the fmt layer;
/// otherwise spans are only emitted to stdout.
pub fn init_telemetry(config: &AppConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.telemetry.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false).compact();

    match &config.telemetry.otlp_endpoint {
        Some(endpoint) => {
            let tracer = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(opentelemetry_otlp::new_exporter().tonic().with_endpoint(endpoint))
                .with_trace_config(trace::config().with_resource(create_resource(config)))
                .install_batch(opentelemetry::runtime::Tokio)?;
            let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .with(otel_layer)
                .try_init()?;
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()?;
        }
    }

    Ok(())
}

fn create_resource(config: &AppConfig) -> Resource {
    Resource::from_detectors(
        std::time::Duration::from_secs(3),
        vec![Box::new(OsResourceDetector), Box::new(ProcessResourceDetector)],
    )
    .merge(&Resource::new(vec![
        KeyValue::new(SERVICE_NAME, config.telemetry.service_name.clone()),
        KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
        KeyValue::new(DEPLOYMENT_ENVIRONMENT, config.telemetry.environment.clone()),
    ]))
}

pub fn shutdown_telemetry() {
    global::shutdown_tracer_provider();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_carries_service_identity() {
        let config = AppConfig::default();
        let resource = create_resource(&config);
        let attributes = resource.into_attributes();

        assert!(attributes.iter().any(|kv| kv.key == SERVICE_NAME));
        assert!(attributes.iter().any(|kv| kv.key == SERVICE_VERSION));
        assert!(attributes.iter().any(|kv| kv.key == DEPLOYMENT_ENVIRONMENT));
    }
}
