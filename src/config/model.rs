// src/config/model.rs

use serde::Deserialize;
use std::{collections::HashMap, path::PathBuf, str::FromStr, time::Duration};
use thiserror::Error;

use super::types::ProbesConfig;

/// Top-level runtime config
#[derive(Debug, Clone)]
pub struct Config {
    pub logging:    LoggingConfig,
    pub monitor:    MonitorSettings,
    pub engine:     EngineConfig,
    pub correlator: CorrelatorSettings,
    pub store:      StoreSettings,
    pub probes:     ProbesConfig,
}

/// Top-level config as deserialized from TOML. Every table is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MasterConfig {
    pub logging:    LoggingConfig,
    pub monitor:    MonitorConfig,
    pub engine:     EngineConfig,
    pub correlator: CorrelatorConfig,
    pub store:      StoreConfig,
    pub probes:     ProbesConfig,
}

/// Mirror of the `[logging]` table
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]            pub enable: bool,
    #[serde(default)]            pub file:   Option<String>,
    #[serde(default = "default_level")] pub level: String,
}
fn default_level() -> String { "INFO".into() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { enable: false, file: None, level: default_level() }
    }
}

/// Mirror of the `[monitor]` table; durations are humantime strings ("8s", "1m").
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub interval:     String,
    pub tick:         String,
    pub stop_timeout: String,
    pub verbose:      bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval:     "8s".into(),
            tick:         "1s".into(),
            stop_timeout: "5s".into(),
            verbose:      false,
        }
    }
}

/// Fully-typed monitor cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    pub interval:     Duration,
    pub tick:         Duration,
    pub stop_timeout: Duration,
    pub verbose:      bool,
}

/// Mirror of the `[engine]` table
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub parallel_probes: bool,
}

/// Mirror of the `[correlator]` table
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CorrelatorConfig {
    pub mode:    String,
    /// Extra or overriding `type → MITRE technique` entries.
    pub mitre:   HashMap<String, String>,
    /// Extra or overriding `type → weight` entries.
    pub weights: HashMap<String, u64>,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self { mode: "aggregate".into(), mitre: HashMap::new(), weights: HashMap::new() }
    }
}

#[derive(Debug, Clone)]
pub struct CorrelatorSettings {
    pub mode:    CorrelatorMode,
    pub mitre:   HashMap<String, String>,
    pub weights: HashMap<String, u64>,
}

/// Which correlator the engine is wired with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelatorMode {
    /// Group by type, one aggregate per group with a MITRE tag.
    Aggregate,
    /// Per-type weights summed into a score.
    Weighted,
}

/// Mirror of the `[store]` table
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend:            String,
    pub dir:                String,
    pub db_path:            String,
    pub synchronous:        String,
    pub journal_size_limit: u64,
    pub ttl_seconds:        u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend:            "json".into(),
            dir:                "reports".into(),
            db_path:            "reports.db".into(),
            synchronous:        "NORMAL".into(),
            journal_size_limit: 50_000_000,
            ttl_seconds:        0,
        }
    }
}

/// Fully-typed store selection; paths are already resolved.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub backend:            StoreBackend,
    pub dir:                PathBuf,
    pub db_path:            PathBuf,
    pub synchronous:        String,
    pub journal_size_limit: u64,
    /// `None` disables retention.
    pub ttl:                Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Json,
    Sqlite,
}

/// All the ways config loading can go wrong
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid correlator mode '{0}'")]
    InvalidCorrelator(String),

    #[error("invalid store backend '{0}'")]
    InvalidBackend(String),

    #[error("invalid duration '{0}': {1}")]
    InvalidDuration(String, #[source] humantime::DurationError),

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Allow `"Weighted"` → `CorrelatorMode::Weighted`
impl FromStr for CorrelatorMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "aggregate" | "aggregated" => Ok(CorrelatorMode::Aggregate),
            "weighted"  | "score"      => Ok(CorrelatorMode::Weighted),
            other                      => Err(ConfigError::InvalidCorrelator(other.into())),
        }
    }
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json"   => Ok(StoreBackend::Json),
            "sqlite" => Ok(StoreBackend::Sqlite),
            other    => Err(ConfigError::InvalidBackend(other.into())),
        }
    }
}
