//! Tracing subscriber setup for binaries and tests that want log output.

use crate::{ConfigError, LogConfig, RegistryError, RegistryResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a global fmt subscriber.
///
/// `RUST_LOG` wins over `config.default_filter`. Fails if a subscriber is
/// already installed.
pub fn init_tracing(config: &LogConfig) -> RegistryResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.default_filter))
        .map_err(|e| {
            RegistryError::Config(ConfigError::InvalidValue {
                field: "default_filter".to_string(),
                value: config.default_filter.clone(),
                reason: e.to_string(),
            })
        })?;

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if config.json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    result.map_err(|e| {
        RegistryError::Config(ConfigError::InvalidValue {
            field: "subscriber".to_string(),
            value: "global".to_string(),
            reason: e.to_string(),
        })
    })?;

    tracing::info!(filter = %config.default_filter, json = config.json, "Tracing initialized");
    Ok(())
}
