//! Layered Configuration
//!
//! Defaults, then an optional TOML file, then `FAILURE_EXPLAINER__*`
//! environment variables.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;
use waterfall_chart::ChartConfig;

/// Config file read when `FAILURE_EXPLAINER_CONFIG` is unset
pub const DEFAULT_CONFIG_FILE: &str = "failure-explainer.toml";

/// Environment variable naming an alternative config file
pub const CONFIG_PATH_ENV: &str = "FAILURE_EXPLAINER_CONFIG";

/// Prefix for per-key environment overrides
pub const ENV_PREFIX: &str = "FAILURE_EXPLAINER";

/// HTTP server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    pub bind_addr: String,
}

/// Model artifact locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Tree ensemble JSON
    pub classifier_path: PathBuf,
    /// Explainer JSON
    pub explainer_path: PathBuf,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Maximum level: trace, debug, info, warn or error
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

/// Metrics settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Install the Prometheus recorder and serve `/metrics`
    pub enabled: bool,
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub models: ModelConfig,
    pub chart: ChartConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_addr: "0.0.0.0:8050".to_string(),
            },
            models: ModelConfig {
                classifier_path: PathBuf::from("models/classifier.json"),
                explainer_path: PathBuf::from("models/explainer.json"),
            },
            chart: ChartConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                json: false,
            },
            metrics: MetricsConfig { enabled: true },
        }
    }
}

impl AppConfig {
    /// Load from the default file location and the process environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(&path, config::Environment::with_prefix(ENV_PREFIX))
    }

    /// Load from an explicit file path and environment source
    pub fn load_from(path: &str, env: config::Environment) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name(path).required(false))
            .add_source(env.separator("__").try_parsing(true))
            .build()?;

        let loaded: AppConfig = settings.try_deserialize()?;
        if loaded.logging.level.parse::<tracing::Level>().is_err() {
            return Err(config::ConfigError::Message(format!(
                "logging.level: unknown level {:?}",
                loaded.logging.level
            )));
        }
        info!("Configuration loaded (file: {})", path);
        Ok(loaded)
    }
}
