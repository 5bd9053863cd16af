//! JSON configuration file adapter.
//!
//! Implements [`ConfigPort`] over a single JSON document.  Fields missing
//! from the file take their defaults; every loaded or saved config is
//! range-checked with [`LineConfig::validate`].

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use log::info;

use crate::app::ports::{ConfigError, ConfigPort};
use crate::config::LineConfig;

pub struct JsonConfigFile {
    path: PathBuf,
}

impl JsonConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the file, or defaults when it does not exist.
    pub fn load_or_default(&self) -> Result<LineConfig, ConfigError> {
        match self.load() {
            Err(ConfigError::NotFound) => {
                info!("JsonConfigFile: {} not found, using defaults", self.path.display());
                Ok(LineConfig::default())
            }
            other => other,
        }
    }
}

impl ConfigPort for JsonConfigFile {
    fn load(&self) -> Result<LineConfig, ConfigError> {
        let text = fs::read_to_string(&self.path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ConfigError::NotFound,
            _ => ConfigError::IoError,
        })?;
        let cfg: LineConfig = serde_json::from_str(&text).map_err(|_| ConfigError::Corrupted)?;
        cfg.validate().map_err(ConfigError::ValidationFailed)?;
        info!("JsonConfigFile: loaded {}", self.path.display());
        Ok(cfg)
    }

    fn save(&self, config: &LineConfig) -> Result<(), ConfigError> {
        config.validate().map_err(ConfigError::ValidationFailed)?;
        let text = serde_json::to_string_pretty(config).map_err(|_| ConfigError::IoError)?;
        fs::write(&self.path, text).map_err(|_| ConfigError::IoError)?;
        info!("JsonConfigFile: saved {}", self.path.display());
        Ok(())
    }
}
