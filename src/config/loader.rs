//! Configuration Loader
//!
//! Layers compiled defaults, an optional TOML file and `AIRAVATA_*`
//! environment overrides through the `config` crate, then validates the
//! merged result.

use super::error::{ConfigResult, ConfigurationError};
use super::OrchestratorConfig;
use config::{Config, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const ENV_PREFIX: &str = "AIRAVATA";
const CONFIG_PATH_VAR: &str = "AIRAVATA_CONFIG_PATH";

/// Loaded, validated configuration shared across the service
#[derive(Debug)]
pub struct ConfigManager {
    config: OrchestratorConfig,
    environment: String,
    source_file: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration from `AIRAVATA_CONFIG_PATH` when set, defaults otherwise
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        let path = env::var(CONFIG_PATH_VAR).ok().map(PathBuf::from);
        Self::load_with_env(path.as_deref(), &Self::detect_environment())
    }

    /// Load configuration from a specific TOML file
    pub fn load_from_file(path: &Path) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_with_env(Some(path), &Self::detect_environment())
    }

    /// Load configuration with an explicit environment name
    pub fn load_with_env(path: Option<&Path>, environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        let mut builder = Config::builder().add_source(Config::try_from(&OrchestratorConfig::default())?);

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigurationError::ConfigFileNotFound {
                    path: path.to_path_buf(),
                });
            }
            debug!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: OrchestratorConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        info!(
            environment = %environment,
            gateway_id = %config.gateway_id,
            worker_pool_size = config.orchestrator.worker_pool_size,
            poll_interval_ms = config.monitor.poll_interval_ms,
            "⚙️ CONFIG: Configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            source_file: path.map(Path::to_path_buf),
        }))
    }

    /// Wrap an already-built configuration, validating it first
    pub fn from_config(config: OrchestratorConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: Self::detect_environment(),
            source_file: None,
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn source_file(&self) -> Option<&Path> {
        self.source_file.as_deref()
    }

    /// Configuration as JSON with the broker credentials masked
    pub fn debug_config(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(&self.config).unwrap_or(serde_json::Value::Null);
        if let Some(url) = value
            .get_mut("messaging")
            .and_then(|messaging| messaging.get_mut("broker_url"))
        {
            *url = serde_json::Value::String(mask_credentials(&self.config.messaging.broker_url));
        }
        value
    }

    fn detect_environment() -> String {
        env::var("AIRAVATA_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }
}

fn mask_credentials(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}***{}", &url[..scheme_end + 3], &url[at..])
        }
        _ => url.to_string(),
    }
}
