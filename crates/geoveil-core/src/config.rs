//! Service configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use geoveil_storage::Database;

use crate::error::GeoError;
use crate::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    /// Master switch; when off every request is denied regardless of settings
    pub enabled: bool,
    /// How long an idle provider stays powered, in milliseconds
    pub provider_timeout_ms: u64,
    /// Outstanding one-shot (or watch) requests a session may hold
    pub max_requests_per_session: usize,
    /// Floor applied to positive request timeouts, in milliseconds
    pub min_timeout_ms: u32,
    /// Answer every permission prompt with this decision instead of asking
    pub prompt_testing: Option<bool>,
    /// Settings database; `None` keeps settings in memory
    pub database_path: Option<PathBuf>,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider_timeout_ms: 6000,
            max_requests_per_session: 1500,
            min_timeout_ms: 10,
            prompt_testing: None,
            database_path: None,
        }
    }
}

impl GeoConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: GeoConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.provider_timeout_ms == 0 {
            return Err(GeoError::Config(
                "provider_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_requests_per_session == 0 {
            return Err(GeoError::Config(
                "max_requests_per_session must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Open the settings database this configuration points at.
    pub fn open_database(&self) -> Result<Database> {
        let db = match &self.database_path {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                Database::open(path)?
            }
            None => Database::open_in_memory()?,
        };
        Ok(db)
    }
}
