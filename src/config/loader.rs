// src/config/loader.rs

//! # Configuration Loader
//!
//! Reads a TOML file, deserializes into `MasterConfig`, and converts the raw
//! tables into the runtime `Config` (parsed durations, resolved paths,
//! typed enums).

use crate::agent_log;
use crate::config::model::{
    Config, CorrelatorConfig, CorrelatorSettings, ConfigError, MasterConfig, MonitorConfig,
    MonitorSettings, StoreConfig, StoreSettings,
};
use crate::config::types::ProbesConfig;
use log::Level;
use std::{fs, path::Path, time::Duration};

/// Load and parse the configuration at `path`.
/// Relative store paths are resolved against `base_dir`.
pub fn load(path: &Path, base_dir: &Path) -> Result<Config, ConfigError> {
    agent_log!(Level::Debug, "config", "Reading config from {:?}", path);
    let txt = fs::read_to_string(path)?;
    let cfg = parse(&txt, base_dir)?;
    agent_log!(Level::Info, "config", "Loaded config from {:?}", path);
    Ok(cfg)
}

/// Parse configuration text. An empty string yields the defaults.
pub fn parse(txt: &str, base_dir: &Path) -> Result<Config, ConfigError> {
    let master: MasterConfig = toml::from_str(txt)?;
    convert(master, base_dir)
}

/// Convert raw TOML tables into the runtime representation.
pub fn convert(master: MasterConfig, base_dir: &Path) -> Result<Config, ConfigError> {
    Ok(Config {
        logging:    master.logging,
        monitor:    convert_monitor_config(master.monitor)?,
        engine:     master.engine,
        correlator: convert_correlator_config(master.correlator)?,
        store:      convert_store_config(master.store, base_dir)?,
        probes:     resolve_probe_paths(master.probes, base_dir),
    })
}

/// The anomaly baseline lives with the agent's data, like the store.
fn resolve_probe_paths(mut probes: ProbesConfig, base_dir: &Path) -> ProbesConfig {
    probes.anomaly.baseline = base_dir.join(&probes.anomaly.baseline).to_string_lossy().into_owned();
    probes
}

fn parse_duration(raw: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(raw.trim())
        .map_err(|e| ConfigError::InvalidDuration(raw.into(), e))
}

/// Convert `[monitor]`; interval and tick must be non-zero.
pub fn convert_monitor_config(cfg: MonitorConfig) -> Result<MonitorSettings, ConfigError> {
    let interval = parse_duration(&cfg.interval)?;
    let tick = parse_duration(&cfg.tick)?;
    let stop_timeout = parse_duration(&cfg.stop_timeout)?;
    if interval.is_zero() {
        return Err(ConfigError::ZeroDuration("monitor.interval"));
    }
    if tick.is_zero() {
        return Err(ConfigError::ZeroDuration("monitor.tick"));
    }
    agent_log!(
        Level::Debug,
        "config",
        "Monitor cadence: interval={:?}, tick={:?}, stop_timeout={:?}",
        interval,
        tick,
        stop_timeout
    );
    Ok(MonitorSettings { interval, tick, stop_timeout, verbose: cfg.verbose })
}

fn convert_correlator_config(cfg: CorrelatorConfig) -> Result<CorrelatorSettings, ConfigError> {
    Ok(CorrelatorSettings {
        mode:    cfg.mode.parse()?,
        mitre:   cfg.mitre,
        weights: cfg.weights,
    })
}

fn convert_store_config(cfg: StoreConfig, base_dir: &Path) -> Result<StoreSettings, ConfigError> {
    let ttl = (cfg.ttl_seconds > 0).then(|| Duration::from_secs(cfg.ttl_seconds));
    Ok(StoreSettings {
        backend:            cfg.backend.parse()?,
        dir:                base_dir.join(&cfg.dir),
        db_path:            base_dir.join(&cfg.db_path),
        synchronous:        cfg.synchronous,
        journal_size_limit: cfg.journal_size_limit,
        ttl,
    })
}
