//! Probe configuration structures.
//!
//! Each probe reads its own `[probes.<name>]` table. Every table is optional
//! and falls back to the built-in indicator lists, so an empty config file
//! yields a fully working probe set.
//!
//! Key responsibilities:
//! - Hold the indicator lists (names, paths, prefixes) probes match against.
//! - Select which probes are enabled.
//! - Keep file-format defaults out of the probe logic.

use serde::Deserialize;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// `[probes]` section of the master config.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProbesConfig {
    /// Probe names to build; empty means every known probe.
    pub enabled:     Vec<String>,
    pub process:     ProcessProbeConfig,
    pub network:     NetworkProbeConfig,
    pub file:        FileProbeConfig,
    pub persistence: PersistenceProbeConfig,
    pub root:        RootProbeConfig,
    pub behavior:    BehaviorProbeConfig,
    pub anomaly:     AnomalyProbeConfig,
    pub package:     PackageProbeConfig,
}

impl ProbesConfig {
    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.is_empty() || self.enabled.iter().any(|n| n.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProcessProbeConfig {
    pub suspicious_names: Vec<String>,
}

impl Default for ProcessProbeConfig {
    fn default() -> Self {
        Self { suspicious_names: strings(&["su", "dd", "nc", "bash", "sh", "dropbear", "busybox"]) }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkProbeConfig {
    /// Remote address prefixes considered suspicious.
    pub remote_prefixes: Vec<String>,
}

impl Default for NetworkProbeConfig {
    fn default() -> Self {
        Self { remote_prefixes: strings(&["185.", "45.", "103."]) }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FileProbeConfig {
    pub roots:            Vec<String>,
    pub suspicious_names: Vec<String>,
}

impl Default for FileProbeConfig {
    fn default() -> Self {
        Self {
            roots:            strings(&["/data/local/tmp", "/sdcard", "/data/data"]),
            suspicious_names: strings(&["su", "busybox", "backdoor", "payload", "dropbear"]),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistenceProbeConfig {
    pub paths: Vec<String>,
}

impl Default for PersistenceProbeConfig {
    fn default() -> Self {
        Self {
            paths: strings(&[
                "/system/etc/init.d",
                "/etc/init.d",
                "/data/local/tmp",
                "/data/system/packages.list",
            ]),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RootProbeConfig {
    pub indicators: Vec<String>,
}

impl Default for RootProbeConfig {
    fn default() -> Self {
        Self {
            indicators: strings(&[
                "/system/xbin/su",
                "/system/bin/su",
                "/sbin/su",
                "/data/adb/magisk",
                "/data/adb/magisk.db",
            ]),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BehaviorProbeConfig {
    /// Staging directories inspected one level deep.
    pub dirs:       Vec<String>,
    pub extensions: Vec<String>,
}

impl Default for BehaviorProbeConfig {
    fn default() -> Self {
        Self {
            dirs:       strings(&["/data/local/tmp"]),
            extensions: strings(&["sh", "bin", "apk"]),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnomalyProbeConfig {
    /// JSON file with `average_*` keys; missing file means no baseline.
    pub baseline:   String,
    pub watch_dirs: Vec<String>,
}

impl Default for AnomalyProbeConfig {
    fn default() -> Self {
        Self {
            baseline:   "baseline.json".into(),
            watch_dirs: strings(&["/data/data", "/sdcard", "/storage/emulated/0"]),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PackageProbeConfig {
    /// Package files to inspect; the probe is unavailable when empty.
    pub packages: Vec<String>,
}
