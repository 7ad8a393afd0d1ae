use anyhow::Result;
use tracing::{info, Subscriber};
use tracing_subscriber::{layer::SubscriberExt, registry::LookupSpan, EnvFilter, Layer};

#[cfg(feature = "telemetry")]
pub fn build_otel_layer<S>(
) -> Result<tracing_opentelemetry::OpenTelemetryLayer<S, opentelemetry_sdk::trace::Tracer>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    use init_tracing_opentelemetry::{init_propagator, otlp, resource::DetectResource};
    use opentelemetry::{global, trace::TracerProvider};

    let otel_rsrc = DetectResource::default()
        .with_fallback_service_name(env!("CARGO_PKG_NAME"))
        .with_fallback_service_version(env!("CARGO_PKG_VERSION"))
        .build();
    let tracerprovider = otlp::init_tracerprovider(otel_rsrc, otlp::identity)?;
    init_propagator()?;
    let layer = tracing_opentelemetry::layer()
        .with_error_records_to_exceptions(true)
        .with_tracer(tracerprovider.tracer(""));
    global::set_tracer_provider(tracerprovider);
    Ok(layer)
}

pub fn build_reduced_logger_text<S>() -> Box<dyn Layer<S> + Send + Sync + 'static>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    if cfg!(debug_assertions) {
        Box::new(
            tracing_subscriber::fmt::layer()
                .with_line_number(false)
                .with_thread_names(false)
                .with_timer(tracing_subscriber::fmt::time::SystemTime)
                .with_target(true)
                .with_span_events(tracing_subscriber::fmt::format::FmtSpan::NONE)
                .event_format(tracing_subscriber::fmt::format().compact()),
        )
    } else {
        Box::new(
            tracing_subscriber::fmt::layer()
                .with_timer(tracing_subscriber::fmt::time::SystemTime)
                .with_target(true),
        )
    }
}

/// `RUST_LOG`, then `OTEL_LOG_LEVEL`, then `warn`.
pub fn build_loglevel_filter_layer() -> EnvFilter {
    let level = std::env::var("RUST_LOG")
        .or_else(|_| std::env::var("OTEL_LOG_LEVEL"))
        .unwrap_or_else(|_| "warn".to_string());
    EnvFilter::try_new(format!(
        "{level},otel::tracing=trace,otel=debug,axum_tracing_opentelemetry=error"
    ))
    .unwrap_or_else(|_| EnvFilter::new("warn"))
}

pub fn init_telemetry_and_tracing(settings: &Option<String>, tracing_enabled: bool) -> Result<()> {
    let subscriber = tracing_subscriber::registry()
        .with(build_loglevel_filter_layer())
        .with(build_reduced_logger_text());

    #[cfg(feature = "telemetry")]
    if tracing_enabled {
        let subscriber = subscriber.with(build_otel_layer()?);
        tracing::subscriber::set_global_default(subscriber)?;
        info!(telemetry = ?settings, "logging and OpenTelemetry traces initialized");
        return Ok(());
    }

    #[cfg(not(feature = "telemetry"))]
    if tracing_enabled {
        eprintln!("telemetry traces requested, but postgate was built without the telemetry feature");
    }

    tracing::subscriber::set_global_default(subscriber)?;
    info!(telemetry = ?settings, "logging initialized");
    Ok(())
}
