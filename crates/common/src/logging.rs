use crate::config::Environment;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, layer::Layered, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Initialize the tracing subscriber: pretty output in development, JSON in
/// production.
///
/// Filtering comes from `RUST_LOG`, falling back to `default_directive`
/// (usually `"info"`). An OpenTelemetry layer is always installed; it is a
/// no-op unless a global tracer provider was registered first.
pub fn setup_logging(environment: Environment, default_directive: &str) {
    install(environment, default_directive, tracing_opentelemetry::layer());
}

/// Install the global subscriber with `otel_layer` between the filter and
/// the formatter.
pub(crate) fn install<L>(environment: Environment, default_directive: &str, otel_layer: L)
where
    L: Layer<Layered<EnvFilter, Registry>> + Send + Sync + 'static,
{
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(otel_layer);

    match environment {
        Environment::Production => {
            registry
                .with(tracing_subscriber::fmt::layer().json().with_level(true))
                .init();
        }
        Environment::Development => {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_ansi(true)
                        .with_target(false),
                )
                .init();
        }
    }
}
