//! Baseline comparison.
//!
//! Counts processes, sockets and files under the watch directories, then
//! compares them with the averages recorded in a baseline JSON file:
//!
//! ```json
//! { "average_process_count": 120, "average_network_connections": 30, "average_open_files": 500 }
//! ```
//!
//! A process count above 1.5x its average, or a connection/file count above
//! 2x, becomes an `anomaly` finding. Without a baseline nothing is reported.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::comms::events::{Finding, Severity};
use crate::config::types::ProbesConfig;
use crate::detection::probe::{Probe, ProbeOutput};
use crate::probes::walk::{list_files, run_cmd};
use crate::agent_log;
use log::Level;

const PROCESS_FACTOR: f64 = 1.5;
const NETWORK_FACTOR: f64 = 2.0;
const FILES_FACTOR: f64 = 2.0;

/// Point-in-time counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metrics {
    pub process_count:       usize,
    pub network_connections: usize,
    pub watch_dir_counts:    BTreeMap<String, usize>,
}

impl Metrics {
    /// Non-blank lines of each listing; recursive file count per directory.
    pub fn gather(ps_text: &str, net_text: &str, watch_dirs: &[PathBuf]) -> Self {
        let non_blank = |t: &str| t.lines().filter(|l| !l.trim().is_empty()).count();
        let watch_dir_counts = watch_dirs
            .iter()
            .map(|d| (d.to_string_lossy().into_owned(), list_files(d).len()))
            .collect();
        Self {
            process_count: non_blank(ps_text),
            network_connections: non_blank(net_text),
            watch_dir_counts,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Baseline {
    pub average_process_count:       Option<f64>,
    pub average_network_connections: Option<f64>,
    pub average_open_files:          Option<f64>,
}

impl Baseline {
    /// `Ok(None)` when the file does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let txt = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&txt)?))
    }
}

fn anomaly(metric: impl Into<String>, value: usize, baseline: f64, reason: &str) -> Finding {
    Finding::new("anomaly")
        .with_severity(Severity::Low)
        .with("metric", metric.into())
        .with("value", value)
        .with("baseline", number(baseline))
        .with("reason", reason)
}

/// Integral baselines stay integers in the report.
fn number(v: f64) -> Value {
    if v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
        Value::from(v as i64)
    } else {
        Value::from(v)
    }
}

/// Compare `metrics` with `baseline`.
pub fn evaluate(metrics: &Metrics, baseline: &Baseline) -> Vec<Finding> {
    let mut out = Vec::new();
    if let Some(b) = baseline.average_process_count {
        if metrics.process_count as f64 > b * PROCESS_FACTOR {
            out.push(anomaly("process_count", metrics.process_count, b, "process spike"));
        }
    }
    if let Some(b) = baseline.average_network_connections {
        if metrics.network_connections as f64 > b * NETWORK_FACTOR {
            out.push(anomaly("network_connections", metrics.network_connections, b, "network spike"));
        }
    }
    if let Some(b) = baseline.average_open_files.filter(|b| *b != 0.0) {
        for (dir, count) in &metrics.watch_dir_counts {
            if *count as f64 > b * FILES_FACTOR {
                out.push(anomaly(format!("files_in_{dir}"), *count, b, "file churn"));
            }
        }
    }
    out
}

pub struct AnomalyProbe {
    baseline:   PathBuf,
    watch_dirs: Vec<PathBuf>,
}

impl AnomalyProbe {
    pub fn new(baseline: PathBuf, watch_dirs: Vec<PathBuf>) -> Self {
        Self { baseline, watch_dirs }
    }

    pub fn build(cfg: &ProbesConfig) -> anyhow::Result<Box<dyn Probe>> {
        let watch_dirs = cfg.anomaly.watch_dirs.iter().map(PathBuf::from).collect();
        Ok(Box::new(Self::new(PathBuf::from(&cfg.anomaly.baseline), watch_dirs)))
    }
}

impl Probe for AnomalyProbe {
    fn name(&self) -> &str {
        "anomaly"
    }

    fn run(&self, verbose: bool) -> anyhow::Result<ProbeOutput> {
        let baseline = match Baseline::load(&self.baseline) {
            Ok(Some(b)) => b,
            Ok(None) => {
                agent_log!(Level::Debug, "anomaly", "no baseline at {:?}", self.baseline);
                return Ok(ProbeOutput::Findings(Vec::new()));
            }
            Err(e) => {
                agent_log!(Level::Warn, "anomaly", "ignoring unreadable baseline {:?}: {:#}", self.baseline, e);
                Baseline::default()
            }
        };

        let ps = run_cmd("ps", &["aux"]).unwrap_or_default();
        let net = run_cmd("ss", &["-tunap"]).unwrap_or_default();
        let metrics = Metrics::gather(&ps, &net, &self.watch_dirs);
        let findings = evaluate(&metrics, &baseline);
        if verbose {
            agent_log!(Level::Info, "anomaly", "metrics={:?} anomalies={}", metrics, findings.len());
        }
        Ok(ProbeOutput::Findings(findings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(procs: usize, conns: usize, dirs: &[(&str, usize)]) -> Metrics {
        Metrics {
            process_count: procs,
            network_connections: conns,
            watch_dir_counts: dirs.iter().map(|(d, c)| (d.to_string(), *c)).collect(),
        }
    }

    #[test]
    fn gather_counts_non_blank_lines_and_files() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a"), "").unwrap();
        fs::write(tmp.path().join("b"), "").unwrap();
        let m = Metrics::gather("h\n\n p1\n p2\n", "", &[tmp.path().to_path_buf()]);
        assert_eq!(m.process_count, 3);
        assert_eq!(m.network_connections, 0);
        assert_eq!(m.watch_dir_counts.values().copied().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn thresholds_are_strict() {
        let base = Baseline {
            average_process_count: Some(100.0),
            average_network_connections: Some(10.0),
            average_open_files: Some(5.0),
        };
        assert!(evaluate(&metrics(150, 20, &[("/d", 10)]), &base).is_empty());

        let hits = evaluate(&metrics(151, 21, &[("/d", 11)]), &base);
        let names: Vec<_> = hits.iter().map(|f| f.field("metric").unwrap().as_str().unwrap()).collect();
        assert_eq!(names, vec!["process_count", "network_connections", "files_in_/d"]);
        assert_eq!(hits[0].field("baseline").unwrap(), 100);
        assert_eq!(hits[2].field("reason").unwrap(), "file churn");
    }

    #[test]
    fn zero_file_baseline_is_ignored() {
        let base = Baseline { average_open_files: Some(0.0), ..Default::default() };
        assert!(evaluate(&metrics(0, 0, &[("/d", 99)]), &base).is_empty());
    }

    #[test]
    fn missing_baseline_reports_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let probe = AnomalyProbe::new(tmp.path().join("baseline.json"), Vec::new());
        assert_eq!(probe.run(false).unwrap(), ProbeOutput::Findings(Vec::new()));
    }
}
