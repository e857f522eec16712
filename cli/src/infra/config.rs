//! YAML configuration file on disk.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::domain::config::{BurrowConfig, validate_config};

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "BURROW_CONFIG";

/// Loads `~/.burrow/config.yaml` (or `$BURROW_CONFIG`).
pub struct YamlConfigStore;

impl YamlConfigStore {
    /// Load and validate the config. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or a value
    /// fails validation.
    pub fn load(&self) -> Result<BurrowConfig> {
        let path = self.path()?;
        let config = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("cannot read {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("cannot parse {}", path.display()))?
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            BurrowConfig::default()
        };
        validate_config(&config).with_context(|| format!("invalid config in {}", path.display()))?;
        Ok(config)
    }

    /// Config file location.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn path(&self) -> Result<PathBuf> {
        if let Ok(val) = std::env::var(CONFIG_ENV) {
            return Ok(PathBuf::from(val));
        }
        let home =
            dirs::home_dir().ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
        Ok(home.join(".burrow").join("config.yaml"))
    }
}
