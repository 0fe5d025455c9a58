//! Static snapshot scan of staging locations for files whose name contains a
//! suspicious token.

use std::path::{Path, PathBuf};

use crate::comms::events::{Finding, RawEvent, Severity};
use crate::config::types::ProbesConfig;
use crate::detection::probe::{Probe, ProbeOutput};
use crate::probes::walk::list_files;
use crate::agent_log;
use log::Level;

pub struct FileProbe {
    roots: Vec<PathBuf>,
    names: Vec<String>,
}

impl FileProbe {
    pub fn new(roots: Vec<PathBuf>, names: Vec<String>) -> Self {
        Self { roots, names: names.into_iter().map(|n| n.to_lowercase()).collect() }
    }

    pub fn build(cfg: &ProbesConfig) -> anyhow::Result<Box<dyn Probe>> {
        let roots = cfg.file.roots.iter().map(PathBuf::from).collect();
        Ok(Box::new(Self::new(roots, cfg.file.suspicious_names.clone())))
    }

    /// First configured token contained in the file name, if any.
    pub fn matching_token(&self, path: &Path) -> Option<&str> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        self.names.iter().find(|s| name.contains(s.as_str())).map(String::as_str)
    }

    fn scan(&self) -> (Vec<Finding>, Vec<RawEvent>) {
        let mut findings = Vec::new();
        let mut events = Vec::new();
        for root in &self.roots {
            if !root.exists() {
                continue;
            }
            for path in list_files(root) {
                let Some(token) = self.matching_token(&path) else { continue };
                let f = Finding::new("suspicious_file")
                    .with_path(path.to_string_lossy())
                    .with_severity(Severity::Medium)
                    .with("match", token);
                events.push(RawEvent::about("file_alert", &f));
                findings.push(f);
            }
        }
        (findings, events)
    }
}

impl Probe for FileProbe {
    fn name(&self) -> &str {
        "file"
    }

    fn run(&self, verbose: bool) -> anyhow::Result<ProbeOutput> {
        let (findings, events) = self.scan();
        if verbose {
            for f in &findings {
                agent_log!(Level::Info, "file", "found {}", f.path.as_deref().unwrap_or_default());
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
    fn walks_roots_and_matches_name_substrings() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("nested/deeper")).unwrap();
        fs::write(tmp.path().join("nested/deeper/My_Payload.bin"), "x").unwrap();
        fs::write(tmp.path().join("notes.txt"), "x").unwrap();

        let probe = FileProbe::new(
            vec![tmp.path().to_path_buf(), tmp.path().join("absent")],
            vec!["payload".into(), "backdoor".into()],
        );
        let out = probe.run(false).unwrap();
        let (findings, events) = out.into_parts("file");

        assert_eq!(findings.len(), 1);
        assert!(findings[0].path.as_deref().unwrap().ends_with("My_Payload.bin"));
        assert_eq!(findings[0].field("match").unwrap(), "payload");
        assert_eq!(events[0].kind, "file_alert");
    }
}
