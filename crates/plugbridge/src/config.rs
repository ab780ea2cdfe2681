//! Configuration system for plugbridge
//!
//! Provides:
//! - Config file discovery (CLI flag, env var, standard paths)
//! - TOML parsing with serde
//! - Environment variable overrides

use plugbridge_cloud::{CloudConfig, Region};
use plugbridge_web::WebConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Complete plugbridge configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlugbridgeConfig {
    /// HTTP server settings
    pub server: ServerSettings,

    /// eWeLink cloud settings
    pub cloud: CloudConfig,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Host to bind
    pub host: String,

    /// Port to bind
    pub port: u16,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// CORS origins; empty allows any origin
    pub allowed_origins: Vec<String>,

    /// Directory with the static frontend
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        let web = WebConfig::default();
        Self {
            host: web.host,
            port: web.port,
            log_level: "info".to_string(),
            allowed_origins: web.allowed_origins,
            static_dir: web.static_dir,
        }
    }
}

impl ServerSettings {
    pub fn web_config(&self) -> WebConfig {
        WebConfig {
            host: self.host.clone(),
            port: self.port,
            allowed_origins: self.allowed_origins.clone(),
            static_dir: self.static_dir.clone(),
        }
    }
}

/// Configuration loader
pub struct ConfigLoader {
    /// Path to config file (if specified via CLI)
    cli_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader
    pub fn new() -> Self {
        Self { cli_path: None }
    }

    /// Set the config path from CLI argument
    pub fn with_cli_path(mut self, path: Option<PathBuf>) -> Self {
        self.cli_path = path;
        self
    }

    /// Load configuration with the following precedence:
    /// 1. CLI --config flag
    /// 2. PLUGBRIDGE_CONFIG environment variable
    /// 3. ~/.config/plugbridge/config.toml
    /// 4. /etc/plugbridge/config.toml
    /// 5. Default values
    ///
    /// Environment variables override file values.
    pub fn load(&self) -> ConfigResult<PlugbridgeConfig> {
        self.load_with(|key| std::env::var(key).ok())
    }

    /// Same as [`load`](Self::load) with variables read through `lookup`
    pub fn load_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> ConfigResult<PlugbridgeConfig> {
        let mut config = match self.find_config_file(&lookup) {
            Some(path) => {
                info!("Loading configuration from: {}", path.display());
                self.load_from_file(&path)?
            }
            None => {
                debug!("No config file found, using defaults");
                PlugbridgeConfig::default()
            }
        };

        self.apply_env_overrides(&mut config, &lookup)?;
        self.validate(&config)?;

        Ok(config)
    }

    /// Find the config file to use
    fn find_config_file(&self, lookup: &impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
        if let Some(path) = &self.cli_path {
            if path.exists() {
                return Some(path.clone());
            }
            warn!("CLI config path does not exist: {}", path.display());
        }

        if let Some(env_path) = lookup("PLUGBRIDGE_CONFIG") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
            warn!("PLUGBRIDGE_CONFIG path does not exist: {}", env_path);
        }

        if let Some(path) = Self::user_config_path(lookup) {
            if path.exists() {
                return Some(path);
            }
        }

        #[cfg(unix)]
        {
            let path = PathBuf::from("/etc/plugbridge/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        None
    }

    /// Load configuration from a TOML file
    fn load_from_file(&self, path: &Path) -> ConfigResult<PlugbridgeConfig> {
        let content = std::fs::read_to_string(path)?;
        let config: PlugbridgeConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(
        &self,
        config: &mut PlugbridgeConfig,
        lookup: &impl Fn(&str) -> Option<String>,
    ) -> ConfigResult<()> {
        if let Some(val) = lookup("PLUGBRIDGE_LOG_LEVEL") {
            config.server.log_level = val;
        }
        if let Some(val) = lookup("PLUGBRIDGE_HOST") {
            config.server.host = val;
        }
        if let Some(val) = lookup("PORT") {
            match val.parse() {
                Ok(port) => config.server.port = port,
                Err(_) => warn!("Ignoring invalid PORT: {}", val),
            }
        }
        if let Some(val) = lookup("PLUGBRIDGE_ALLOWED_ORIGINS") {
            config.server.allowed_origins = val
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(val) = lookup("EWELINK_REGION") {
            val.parse::<Region>()
                .map_err(|e| ConfigError::ValidationError(format!("EWELINK_REGION: {}", e)))?;
        }
        config.cloud.apply_env_with(lookup);

        Ok(())
    }

    /// Validate configuration
    fn validate(&self, config: &PlugbridgeConfig) -> ConfigResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&config.server.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log level: {}. Must be one of: {:?}",
                config.server.log_level, valid_levels
            )));
        }

        if config.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "Server port cannot be 0".to_string(),
            ));
        }

        config
            .cloud
            .validate()
            .map_err(|e| ConfigError::ValidationError(format!("cloud: {}", e)))?;

        let mut seen = std::collections::HashSet::new();
        for entry in &config.cloud.overrides {
            if entry.device_id.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "Override with empty device_id".to_string(),
                ));
            }
            if !seen.insert(entry.device_id.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate override for device {}",
                    entry.device_id
                )));
            }
        }

        Ok(())
    }

    /// Save configuration to a file
    pub fn save(&self, config: &PlugbridgeConfig, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(config).map_err(|e| {
            ConfigError::ValidationError(format!("Failed to serialize config: {}", e))
        })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        info!("Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Get the default config file path for the current user
    pub fn default_config_path() -> Option<PathBuf> {
        Self::user_config_path(&|key| std::env::var(key).ok())
    }

    fn user_config_path(lookup: &impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
        lookup("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| lookup("HOME").map(|home| PathBuf::from(home).join(".config")))
            .map(|dir| dir.join("plugbridge").join("config.toml"))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
