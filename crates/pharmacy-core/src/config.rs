//! Engine configuration.
//!
//! ## Load Order (later overrides earlier)
//! 1. Default values
//! 2. TOML config file
//! 3. Environment variables (`PHARMACY_DB_PATH`, `PHARMACY_BUSY_TIMEOUT_MS`,
//!    `PHARMACY_TOLERANCE`)
//!
//! ```toml
//! [database]
//! path = "data/pharmacy.db"
//! busy_timeout_ms = 5000
//!
//! [equivalence]
//! tolerance = 0.25
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::dosage::{EquivalenceCalculator, DEFAULT_TOLERANCE};

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PharmacyConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub equivalence: EquivalenceConfig,
}

/// SQLite connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    /// Database file, `None` for an in-memory database
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// How long a connection waits for another writer before failing
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

/// Dosage equivalence settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EquivalenceConfig {
    /// Fractional overage accepted when rounding a conversion up
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

impl Default for EquivalenceConfig {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
        }
    }
}

fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE
}

impl EquivalenceConfig {
    pub fn calculator(&self) -> EquivalenceCalculator {
        EquivalenceCalculator::new(self.tolerance)
    }
}

impl PharmacyConfig {
    /// Loads configuration from an optional TOML file and the process environment.
    pub fn load(config_path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match config_path {
            Some(path) if path.exists() => {
                info!(?path, "Loading pharmacy config from file");
                Self::from_toml_str(&std::fs::read_to_string(path)?)?
            }
            Some(path) => {
                debug!(?path, "Config file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text. Missing sections take defaults.
    pub fn from_toml_str(contents: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Apply overrides from a variable lookup (the environment in production).
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("PHARMACY_DB_PATH") {
            self.database.path = Some(PathBuf::from(path));
        }

        if let Some(raw) = lookup("PHARMACY_BUSY_TIMEOUT_MS") {
            self.database.busy_timeout_ms = raw.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("PHARMACY_BUSY_TIMEOUT_MS is not a number: {}", raw))
            })?;
        }

        if let Some(raw) = lookup("PHARMACY_TOLERANCE") {
            self.equivalence.tolerance = raw.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("PHARMACY_TOLERANCE is not a number: {}", raw))
            })?;
        }

        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        let tolerance = self.equivalence.tolerance;
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "Tolerance must be a non-negative fraction, got: {}",
                tolerance
            )));
        }
        Ok(())
    }
}
