//! Configuration for the Warden agent

use std::path::Path;

use serde::{Deserialize, Serialize};
use warden_cpu_guard::GuardConfig;
use warden_detect::ServerDetector;

use crate::error::AgentResult;

/// Environment variable prefix, e.g. `WARDEN_GUARD__USAGE_FRACTION=0.5`
pub const ENV_PREFIX: &str = "WARDEN";

/// Main agent configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// CPU self-protection
    #[serde(default)]
    pub guard: GuardConfig,

    /// Server detection
    #[serde(default)]
    pub detection: DetectionConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server detection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Offer class-load events to the detectors at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Restrict detection to these servers; all when unset
    #[serde(default)]
    pub servers: Option<Vec<ServerDetector>>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            servers: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AgentConfig {
    /// Load configuration: defaults, then an optional file, then `WARDEN_*`
    /// environment variables
    pub fn load(path: Option<&Path>) -> AgentResult<Self> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&AgentConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AgentConfig = builder.build()?.try_deserialize()?;
        config.guard.validate()?;
        Ok(config)
    }
}
