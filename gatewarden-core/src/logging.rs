//! Logging subsystem
//!
//! Thin wrapper around `tracing-subscriber`: an env filter seeded from the
//! configured level (`RUST_LOG` wins when set) and either a plain or a JSON
//! fmt layer.

use crate::config::LoggingConfig;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),
}

/// Initialize the global subscriber from the logging config.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let fmt_layer = fmt::layer().with_target(config.with_target);

    if config.json_format {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer.json())
            .try_init()
            .map_err(|e| LoggingError::InitializationFailed(e.to_string()))?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| LoggingError::InitializationFailed(e.to_string()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_init_reports_error() {
        let config = LoggingConfig::default();
        let first = init_logging(&config);
        let second = init_logging(&config);
        // Whichever call lost the race, the second must fail cleanly.
        assert!(first.is_err() || second.is_err());
    }
}
