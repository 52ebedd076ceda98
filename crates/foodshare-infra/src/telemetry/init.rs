use foodshare_core::LogFormat;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub fn default_filter(environment: &str) -> &'static str {
    match environment.to_lowercase().as_str() {
        "production" | "prod" => "foodshare=info,sqlx=warn",
        _ => "foodshare=debug,sqlx=warn",
    }
}

/// Install the global subscriber: `RUST_LOG` (or the default filter) plus a pretty or
/// JSON formatting layer.
pub fn init_telemetry(
    service_name: &str,
    environment: &str,
    format: LogFormat,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter(environment).into());

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true),
            )
            .try_init()?,
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?,
    }

    tracing::info!(
        service = service_name,
        environment = environment,
        format = ?format,
        "Tracing initialized"
    );
    Ok(())
}

pub async fn shutdown_telemetry() {
    tracing::debug!("Telemetry shutdown");
}
