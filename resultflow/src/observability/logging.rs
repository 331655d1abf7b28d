//! Global tracing subscriber setup.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::errors::ResultflowError;

/// Settings for the global tracing subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset, e.g. `"info"` or
    /// `"resultflow=debug"`.
    pub level: String,
    /// Emit one JSON object per event instead of human-readable lines.
    pub json: bool,
    /// Include the event target (module path).
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            with_target: true,
        }
    }
}

impl LoggingConfig {
    /// Creates the default config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the filter directive.
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Enables or disables JSON output.
    #[must_use]
    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    /// Parses a config from JSON.
    pub fn from_json(json: &str) -> Result<Self, ResultflowError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Builds the event filter; `RUST_LOG` wins over the configured level.
    pub fn env_filter(&self) -> Result<EnvFilter, ResultflowError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.level).map_err(|e| {
            ResultflowError::Config(format!("invalid log level '{}': {e}", self.level))
        })
    }
}

/// Installs a global `tracing` subscriber.
///
/// Fails with [`ResultflowError::Config`] if the level does not parse or a
/// global subscriber is already set.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), ResultflowError> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.env_filter()?)
        .with_target(config.with_target);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| ResultflowError::Config(format!("failed to install subscriber: {e}")))
}
