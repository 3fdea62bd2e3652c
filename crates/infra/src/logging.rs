//! Tracing subscriber bootstrap
//!
//! `RUST_LOG` wins over the configured level when set.

use tidemark_domain::{LoggingConfig, Result, TidemarkError};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Build the filter for `config`, preferring `RUST_LOG`.
///
/// # Errors
/// Returns `TidemarkError::Config` when the configured level is not a valid
/// filter directive.
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            TidemarkError::Config(format!("Invalid log level '{}': {e}", config.level))
        }),
    }
}

/// Install the global subscriber.
///
/// # Errors
/// Returns `TidemarkError::Config` for an invalid level, or
/// `TidemarkError::Internal` when a global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = env_filter(config)?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if config.json {
        registry.with(fmt::layer().json().with_current_span(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    installed.map_err(|e| TidemarkError::Internal(format!("Failed to initialise logging: {e}")))
}
