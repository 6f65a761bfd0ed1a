use crate::cli::LogFormat;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// `--log-level` overrides `RUST_LOG` for this process; `--log-format`
/// picks human-readable or line-delimited JSON output.
pub fn init(log_level: Option<&str>, format: LogFormat) {
    let filter = match log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("hearth_app=info,hearth_connection=info,hearth_pipeline=info,hearth_writer=info,hearth_alerts=info")),
    };

    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}
