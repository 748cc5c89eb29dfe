//! Configuration types for the harvester and the observation processor.
//!
//! Values come from a TOML file (`sos.toml`) whose sections map onto
//! [`HarvestConfig`] and [`ProcessConfig`]. Every field has a default, so a
//! missing file or a partial file is valid.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::AppError;

/// Physical copy of the Artportalen database a query is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Replica {
    /// The primary database.
    Live,
    /// The hot standby copy.
    #[default]
    Backup,
}

impl fmt::Display for Replica {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Backup => write!(f, "backup"),
        }
    }
}

impl FromStr for Replica {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "live" => Ok(Self::Live),
            "backup" => Ok(Self::Backup),
            _ => Err(AppError::ConfigError(format!(
                "Unknown replica: '{}'. Valid options: live, backup",
                s
            ))),
        }
    }
}

/// Number of site ids fetched per site query.
pub const DEFAULT_SITE_WINDOW_SIZE: usize = 10_000;

/// Artportalen harvest configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Width of one id range in a full harvest.
    pub chunk_size: usize,
    /// Number of ids per chunk in an incremental harvest.
    pub incremental_chunk_size: usize,
    /// Maximum number of chunks in flight. Also bounds concurrent site queries.
    pub no_of_threads: usize,
    /// Upper bound on modified ids processed by one incremental run.
    pub catch_up_limit: usize,
    /// Debug cap on harvested sightings. Selects the most recent ids.
    pub max_number_of_sightings_harvested: Option<usize>,
    /// Debug cap on harvested checklists.
    pub max_number_of_checklists_harvested: Option<usize>,
    /// Number of site ids per site query.
    pub site_window_size: usize,
    /// Replica used by full harvests.
    pub full_replica: Replica,
    /// Replica used by incremental harvests.
    pub incremental_replica: Replica,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            chunk_size: 25_000,
            incremental_chunk_size: 2_500,
            no_of_threads: 8,
            catch_up_limit: 100_000,
            max_number_of_sightings_harvested: None,
            max_number_of_checklists_harvested: None,
            site_window_size: DEFAULT_SITE_WINDOW_SIZE,
            full_replica: Replica::Backup,
            incremental_replica: Replica::Live,
        }
    }
}

impl HarvestConfig {
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    pub fn with_incremental_chunk_size(mut self, size: usize) -> Self {
        self.incremental_chunk_size = size.max(1);
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.no_of_threads = threads.max(1);
        self
    }

    pub fn with_catch_up_limit(mut self, limit: usize) -> Self {
        self.catch_up_limit = limit;
        self
    }

    pub fn with_max_sightings(mut self, max: usize) -> Self {
        self.max_number_of_sightings_harvested = Some(max);
        self
    }

    /// Replica to query for the given kind of run.
    pub fn replica_for(&self, incremental: bool) -> Replica {
        if incremental {
            self.incremental_replica
        } else {
            self.full_replica
        }
    }

    /// Rejects values that would stall the harvest.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.chunk_size == 0 || self.incremental_chunk_size == 0 {
            return Err(AppError::ConfigError(
                "chunk sizes must be greater than zero".to_string(),
            ));
        }
        if self.no_of_threads == 0 {
            return Err(AppError::ConfigError(
                "no_of_threads must be greater than zero".to_string(),
            ));
        }
        if self.site_window_size == 0 {
            return Err(AppError::ConfigError(
                "site_window_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Verbatim to observation processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    /// Number of verbatim records read and written per page.
    pub batch_size: usize,
    /// Maximum number of pages cast concurrently.
    pub no_of_threads: usize,
    /// Publish diffused copies of sensitive observations to the public index.
    pub diffuse_if_supported: bool,
    /// Data provider id stamped on every processed observation.
    pub data_provider_id: i32,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            batch_size: 5_000,
            no_of_threads: 4,
            diffuse_if_supported: true,
            data_provider_id: 1,
        }
    }
}

/// Root of `sos.toml`.
///
/// # Example
///
/// ```toml
/// [artportalen]
/// chunk_size = 25000
/// no_of_threads = 8
/// catch_up_limit = 100000
///
/// [processing]
/// batch_size = 5000
/// diffuse_if_supported = true
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SosConfig {
    pub artportalen: HarvestConfig,
    pub processing: ProcessConfig,
}

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "sos.toml";

/// Returns the default configuration file path (`~/.config/sos/sos.toml`).
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("sos").join(CONFIG_FILE_NAME))
}

/// Loads the configuration.
///
/// * `Some(path)` - the file must exist and parse.
/// * `None` - the default path is used if it exists, otherwise defaults.
pub fn load_config(path: Option<PathBuf>) -> Result<SosConfig, AppError> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(AppError::ConfigError(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => match default_config_path() {
            Some(p) if p.exists() => p,
            _ => {
                tracing::debug!("No config file found, using defaults");
                return Ok(SosConfig::default());
            }
        },
    };

    read_config(&config_path)
}

fn read_config(path: &Path) -> Result<SosConfig, AppError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        AppError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
    })?;
    let config = parse_config(&content)?;
    tracing::info!(path = %path.display(), "Loaded configuration");
    Ok(config)
}

/// Parses and validates TOML configuration text.
pub fn parse_config(content: &str) -> Result<SosConfig, AppError> {
    let config: SosConfig = toml::from_str(content)
        .map_err(|e| AppError::ConfigError(format!("Invalid TOML: {}", e)))?;
    config.artportalen.validate()?;
    Ok(config)
}
