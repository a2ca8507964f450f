//! Configuration management for the Crystalys CLI
//!
//! Layered with figment: built-in defaults, then `crystalys.toml` in the
//! working directory, then `~/.crystalys/config.toml`, then an explicit
//! `--config` file, then `CRYSTALYS_` environment variables. Nested keys use a
//! double underscore, e.g. `CRYSTALYS_COORDINATOR__ARTIFACTS__HOST=mirror`.

use std::path::{Path, PathBuf};

use crystalys_core::CoordinatorConfig;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "crystalys.toml";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "CRYSTALYS_";

// ----------------------------------------------------------------------------
// Configuration Types
// ----------------------------------------------------------------------------

/// Complete CLI configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliAppConfig {
    /// Session, reconnect and artifact settings shared with the library
    pub coordinator: CoordinatorConfig,
    /// CLI presentation settings
    pub cli: CliConfig,
}

/// CLI presentation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Enable verbose logging
    pub verbose: bool,
    /// Directory for downloaded artifacts when `--out` is not given
    pub output_dir: Option<PathBuf>,
    /// Pretty-print JSON output
    pub pretty_json: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            output_dir: None,
            pretty_json: true,
        }
    }
}

// ----------------------------------------------------------------------------
// Loading
// ----------------------------------------------------------------------------

impl CliAppConfig {
    /// Load configuration from the default sources
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(None)
    }

    /// Load configuration, layering `explicit` above the default files
    pub fn load_with(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConfigError::FileSystem(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
        }

        let config: Self = Self::figment(explicit)
            .extract()
            .map_err(|e| ConfigError::Loading(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Assemble the provider stack
    pub fn figment(explicit: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(CliAppConfig::default()))
            .merge(Toml::file(LOCAL_CONFIG_FILE));

        if let Some(path) = Self::default_config_path() {
            figment = figment.merge(Toml::file(path));
        }

        if let Some(path) = explicit {
            figment = figment.merge(Toml::file(path));
        }

        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load configuration from a single file on top of the defaults
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = Figment::from(Serialized::defaults(CliAppConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .extract()
            .map_err(|e| ConfigError::Loading(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration as TOML, creating parent directories
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ConfigError::FileSystem(format!(
                        "Failed to create {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| {
            ConfigError::FileSystem(format!("Failed to write {}: {}", path.display(), e))
        })
    }

    /// Render as pretty TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialization(e.to_string()))
    }

    /// `~/.crystalys/config.toml`
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".crystalys").join("config.toml"))
    }

    /// Apply command-line overrides
    pub fn apply_overrides(&mut self, verbose: bool, host: Option<&str>) {
        if verbose {
            self.cli.verbose = true;
        }
        if let Some(host) = host {
            self.coordinator.artifacts.host = host.to_string();
        }
    }

    /// Validate the assembled configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.coordinator
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;

        if let Some(dir) = &self.cli.output_dir {
            if dir.as_os_str().is_empty() {
                return Err(ConfigError::Validation(
                    "Output directory cannot be empty".to_string(),
                ));
            }
        }

        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Errors
// ----------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration loading error: {0}")]
    Loading(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}
