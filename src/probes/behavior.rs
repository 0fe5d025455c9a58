//! Heuristic: scripts and binaries dropped at the top of a staging directory.

use std::path::{Path, PathBuf};

use crate::comms::events::{Finding, RawEvent, Severity};
use crate::config::types::ProbesConfig;
use crate::detection::probe::{Probe, ProbeOutput};
use crate::probes::walk::top_level_files;
use crate::agent_log;
use log::Level;

pub struct BehaviorProbe {
    dirs:       Vec<PathBuf>,
    extensions: Vec<String>,
}

impl BehaviorProbe {
    pub fn new(dirs: Vec<PathBuf>, extensions: Vec<String>) -> Self {
        let extensions = extensions
            .into_iter()
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .collect();
        Self { dirs, extensions }
    }

    pub fn build(cfg: &ProbesConfig) -> anyhow::Result<Box<dyn Probe>> {
        let dirs = cfg.behavior.dirs.iter().map(PathBuf::from).collect();
        Ok(Box::new(Self::new(dirs, cfg.behavior.extensions.clone())))
    }

    pub fn is_flagged(&self, path: &Path) -> bool {
        path.extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .is_some_and(|ext| self.extensions.iter().any(|x| *x == ext))
    }
}

impl Probe for BehaviorProbe {
    fn name(&self) -> &str {
        "behavior"
    }

    fn run(&self, verbose: bool) -> anyhow::Result<ProbeOutput> {
        let mut findings = Vec::new();
        let mut events = Vec::new();
        for dir in &self.dirs {
            for path in top_level_files(dir).into_iter().filter(|p| self.is_flagged(p)) {
                let f = Finding::new("suspicious_local_file")
                    .with_path(path.to_string_lossy())
                    .with_severity(Severity::Low);
                if verbose {
                    agent_log!(Level::Info, "behavior", "heuristic hit {:?}", path);
                }
                events.push(RawEvent::about("behavior_hint", &f));
                findings.push(f);
            }
        }
        Ok(ProbeOutput::batch(findings, events))
    }
}
