//! Tracing setup.

use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::config::{LogFormat, LoggingConfig};
use crate::error::ConfigError;

/// Target of the per-record create/update/delete audit lines.
pub const AUDIT_TARGET: &str = "cloudsync::audit";

/// Installs the global subscriber. `RUST_LOG` overrides the configured
/// filter. Returns `Ok(false)` if a subscriber was already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<bool, ConfigError> {
    let directives = match std::env::var("RUST_LOG") {
        Ok(value) if !value.trim().is_empty() => value,
        _ => config.filter.clone(),
    };
    let filter = EnvFilter::try_new(&directives).map_err(|e| ConfigError::Validation {
        message: format!("invalid log filter '{}': {}", directives, e),
    })?;

    let layer = match config.format {
        LogFormat::Pretty => fmt::layer().with_target(true).boxed(),
        LogFormat::Json => fmt::layer().json().with_current_span(true).boxed(),
    };
    let subscriber = tracing_subscriber::registry().with(layer).with(filter);

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return Ok(false);
    }
    // Bridge `log` records from code that uses the log facade.
    if let Err(e) = LogTracer::init() {
        tracing::debug!("log bridge already installed: {}", e);
    }
    Ok(true)
}
