//! Configuration module for signalpath-rs
//!
//! [`DataPathConfig`] collects the defaults used when connections, readers
//! and generators are created from configuration rather than code. It is
//! stored as TOML; every field has a default so partial files are valid.
//!
//! # Example
//!
//! ```ignore
//! use signalpath_rs::config::DataPathConfig;
//!
//! let config = DataPathConfig::load("datapath.toml")?;
//! let reader = StreamReader::new(&signal, config.reader)?;
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{DataPathError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default generator sample rate in Hz
pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 1000;

/// Default generator packet size
pub const DEFAULT_SAMPLES_PER_PACKET: usize = 100;

/// Default tracing filter for the binary
pub const DEFAULT_LOG_FILTER: &str = "info,signalpath_rs=debug";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataPathConfig {
    /// Tracing filter used when `RUST_LOG` is not set
    pub log_filter: String,

    /// Defaults for input ports created without explicit settings
    pub connection: ConnectionSettings,

    pub reader: ReaderSettings,

    pub multi_reader: MultiReaderSettings,

    pub generator: GeneratorConfig,
}

impl Default for DataPathConfig {
    fn default() -> Self {
        Self {
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            connection: ConnectionSettings::default(),
            reader: ReaderSettings::default(),
            multi_reader: MultiReaderSettings::default(),
            generator: GeneratorConfig::default(),
        }
    }
}

impl DataPathConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| DataPathError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DataPathError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load a config file, returning defaults on any error
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| DataPathError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)
            .map_err(|e| DataPathError::Config(format!("Failed to write config: {}", e)))
    }

    /// Reject values no component can work with
    pub fn validate(&self) -> Result<()> {
        for (section, conn) in [
            ("connection", &self.connection),
            ("reader.connection", &self.reader.connection),
            ("multi_reader.connection", &self.multi_reader.connection),
        ] {
            if conn.high_water_mark == Some(0) {
                return Err(DataPathError::Config(format!(
                    "{}.high_water_mark must be at least 1",
                    section
                )));
            }
        }
        if self.generator.sample_rate_hz == 0 {
            return Err(DataPathError::Config(
                "generator.sample_rate_hz must be positive".to_string(),
            ));
        }
        if self.generator.samples_per_packet == 0 {
            return Err(DataPathError::Config(
                "generator.samples_per_packet must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
