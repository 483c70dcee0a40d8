use crate::config::LoggingConfig;
use crate::error::{BridgeError, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Install the global tracing subscriber for a service host.
///
/// Builds an `EnvFilter` (RUST_LOG wins over the configured level), a
/// formatted stderr layer in the configured format, and, when a log
/// directory is configured, a non-blocking daily-rolling file layer. The
/// returned guard must be held for as long as file logging should keep
/// flushing.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("svcbridge={}", config.level)));

    let fmt_layer = match config.format.as_str() {
        "json" => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .boxed(),
        "compact" => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .boxed(),
        _ => fmt::layer().pretty().with_target(true).boxed(),
    };

    let (file_layer, guard) = match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false).boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .try_init()
        .map_err(|e| BridgeError::system(format!("failed to initialise logging: {}", e)))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_claims_global_subscriber_once() {
        let config = LoggingConfig::default();

        let first = init(&config);
        assert!(first.is_ok());
        // No file directory configured, so no appender guard.
        assert!(first.unwrap().is_none());

        // The global subscriber slot is already taken.
        let second = init(&config);
        assert!(matches!(second, Err(BridgeError::System { .. })));
    }
}
