//! Configuration file support for GlucoDyn.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/glucodyn/config.toml`.

use crate::decoder::DecoderOptions;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub simulation: SimulationConfig,

    #[serde(default)]
    pub decoder: DecoderConfig,
}

/// Simulation window configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Duration of the insulin action curve, in hours
    #[serde(default = "default_insulin_action_hours")]
    pub insulin_action_hours: u32,

    #[serde(default = "default_max_carb_absorption_hours")]
    pub max_carb_absorption_hours: u32,

    /// Explicit window; derived from the two durations above when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sim_hours: Option<u32>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            insulin_action_hours: default_insulin_action_hours(),
            max_carb_absorption_hours: default_max_carb_absorption_hours(),
            sim_hours: None,
        }
    }
}

impl SimulationConfig {
    /// Length of the simulation window on either side of the zero reference
    pub fn sim_hours(&self) -> u32 {
        self.sim_hours.unwrap_or_else(|| {
            self.insulin_action_hours
                .max(self.max_carb_absorption_hours)
        })
    }
}

/// Decoder tuning
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DecoderConfig {
    #[serde(default = "default_carb_absorption_minutes")]
    pub carb_absorption_minutes: u32,

    #[serde(default = "default_duplicate_carb_window_seconds")]
    pub duplicate_carb_window_seconds: u32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            carb_absorption_minutes: default_carb_absorption_minutes(),
            duplicate_carb_window_seconds: default_duplicate_carb_window_seconds(),
        }
    }
}

impl From<&DecoderConfig> for DecoderOptions {
    fn from(config: &DecoderConfig) -> Self {
        DecoderOptions {
            carb_absorption_minutes: config.carb_absorption_minutes,
            duplicate_carb_window_seconds: i64::from(config.duplicate_carb_window_seconds),
        }
    }
}

// Default value functions
fn default_insulin_action_hours() -> u32 {
    4
}

fn default_max_carb_absorption_hours() -> u32 {
    4
}

fn default_carb_absorption_minutes() -> u32 {
    180
}

fn default_duplicate_carb_window_seconds() -> u32 {
    60
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> Result<PathBuf> {
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .ok_or_else(|| Error::Config("Unable to locate a config directory".into()))?;
        Ok(base.join("glucodyn").join("config.toml"))
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Check values the decoder cannot work with
    pub fn validate(&self) -> Result<()> {
        let sim_hours = self.simulation.sim_hours();
        if sim_hours == 0 {
            return Err(Error::Config("simulation window must be at least one hour".into()));
        }
        if sim_hours >= 24 {
            return Err(Error::Config(format!(
                "simulation window of {} hours must be shorter than a day",
                sim_hours
            )));
        }
        if self.decoder.carb_absorption_minutes == 0 {
            return Err(Error::Config("carb absorption must be positive".into()));
        }
        Ok(())
    }

    pub fn decoder_options(&self) -> DecoderOptions {
        DecoderOptions::from(&self.decoder)
    }
}
