use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use weewx_config::{LogFormat, LoggingConfig};

pub const DEFAULT_FILTER: &str = "info,weex=debug";

/// Filter directives: `RUST_LOG`, then the configured filter, then the default
pub fn filter_directives(config: &LoggingConfig) -> String {
    std::env::var("RUST_LOG")
        .ok()
        .or_else(|| config.filter.clone())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

/// Initialize logging for `service_name`.
/// - JSON logs by default, human-readable with `format = "pretty"`
/// - RUST_LOG respected; default to "info,weex=debug"
pub fn init(service_name: &str, config: &LoggingConfig) {
    let env_filter = EnvFilter::new(filter_directives(config));
    let registry = tracing_subscriber::registry().with(env_filter);

    match config.format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }

    tracing::info!(service = %service_name, format = ?config.format, "Logging initialized");
}
