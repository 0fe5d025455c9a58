//! Init-script and autostart locations: every regular file directly inside a
//! configured directory is reported.

use std::path::PathBuf;

use crate::comms::events::{Finding, RawEvent, Severity};
use crate::config::types::ProbesConfig;
use crate::detection::probe::{Probe, ProbeOutput};
use crate::probes::walk::top_level_files;
use crate::agent_log;
use log::Level;

pub struct PersistenceProbe {
    paths: Vec<PathBuf>,
}

impl PersistenceProbe {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }

    pub fn build(cfg: &ProbesConfig) -> anyhow::Result<Box<dyn Probe>> {
        Ok(Box::new(Self::new(cfg.persistence.paths.iter().map(PathBuf::from).collect())))
    }
}

impl Probe for PersistenceProbe {
    fn name(&self) -> &str {
        "persistence"
    }

    fn run(&self, verbose: bool) -> anyhow::Result<ProbeOutput> {
        let mut findings = Vec::new();
        let mut events = Vec::new();
        // plain files in the list (e.g. packages.list) are not directories and yield nothing
        for dir in self.paths.iter().filter(|p| p.is_dir()) {
            for child in top_level_files(dir) {
                if verbose {
                    agent_log!(Level::Info, "persistence", "found {:?}", child);
                }
                let f = Finding::new("persistence_file")
                    .with_path(child.to_string_lossy())
                    .with_severity(Severity::Medium);
                events.push(RawEvent::about("persistence", &f));
                findings.push(f);
            }
        }
        Ok(ProbeOutput::batch(findings, events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn reports_top_level_files_only() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("99start"), "#!/bin/sh").unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        fs::write(tmp.path().join("sub/hidden"), "x").unwrap();
        let list_file = tmp.path().join("99start");

        let probe = PersistenceProbe::new(vec![tmp.path().to_path_buf(), list_file]);
        let (findings, events) = probe.run(false).unwrap().into_parts("persistence");

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, "persistence_file");
        assert_eq!(events[0].kind, "persistence");
        assert_eq!(events[0].data["path"], findings[0].path.clone().unwrap().as_str());
    }
}
