//! Best-effort static package inspection: string and permission hits in the
//! raw bytes of each configured package file, folded into a risk score.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use serde_json::{json, Map, Value};

use crate::comms::events::{Finding, RawEvent, Severity};
use crate::config::types::ProbesConfig;
use crate::detection::probe::{Probe, ProbeOutput};
use crate::agent_log;
use log::Level;

const KEYWORDS: &[&str] = &[
    "su",
    "frida",
    "dex",
    "exec",
    "Runtime.getRuntime",
    "java.lang.Runtime",
    "getRuntime",
    "shell",
    "su\0",
];

const PERMISSIONS: &[&str] = &["android.permission", "READ_SMS", "SEND_SMS", "RECEIVE_SMS", "RECORD_AUDIO"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageAnalysis {
    pub strings_hits:      Vec<&'static str>,
    pub permissions_guess: Vec<&'static str>,
    pub risk_score:        u32,
}

impl PackageAnalysis {
    pub fn of(bytes: &[u8]) -> Self {
        let text = String::from_utf8_lossy(bytes);
        let strings_hits: Vec<_> = KEYWORDS.iter().copied().filter(|k| text.contains(k)).collect();
        let permissions_guess: Vec<_> = PERMISSIONS.iter().copied().filter(|p| text.contains(p)).collect();
        let risk_score = (strings_hits.len() as u32 * 10 + permissions_guess.len() as u32 * 8).min(100);
        Self { strings_hits, permissions_guess, risk_score }
    }

    pub fn severity(&self) -> Severity {
        match self.risk_score {
            70.. => Severity::High,
            30.. => Severity::Medium,
            _ => Severity::Low,
        }
    }
}

pub struct PackageProbe {
    packages: Vec<PathBuf>,
}

impl PackageProbe {
    pub fn new(packages: Vec<PathBuf>) -> Self {
        Self { packages }
    }

    pub fn build(cfg: &ProbesConfig) -> anyhow::Result<Box<dyn Probe>> {
        if cfg.package.packages.is_empty() {
            bail!("no package files configured");
        }
        Ok(Box::new(Self::new(cfg.package.packages.iter().map(PathBuf::from).collect())))
    }

    fn analyze(path: &Path) -> anyhow::Result<(u64, PackageAnalysis)> {
        let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        Ok((bytes.len() as u64, PackageAnalysis::of(&bytes)))
    }
}

impl Probe for PackageProbe {
    fn name(&self) -> &str {
        "package"
    }

    fn run(&self, verbose: bool) -> anyhow::Result<ProbeOutput> {
        let mut findings = Vec::new();
        let mut events = Vec::new();
        for path in &self.packages {
            let (size, analysis) = match Self::analyze(path) {
                Ok(r) => r,
                Err(e) => {
                    agent_log!(Level::Error, "package", "skipping package: {:#}", e);
                    continue;
                }
            };
            let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            if verbose {
                agent_log!(Level::Info, "package", "{} score={} hits={:?}", name, analysis.risk_score, analysis.strings_hits);
            }

            let mut data = Map::new();
            data.insert("package".into(), Value::from(name.as_str()));
            data.insert("path".into(), Value::from(path.to_string_lossy().as_ref()));
            data.insert("size_bytes".into(), Value::from(size));
            data.insert("risk_score".into(), Value::from(analysis.risk_score));
            events.push(RawEvent::new("package_scanned", data));

            if analysis.risk_score > 0 {
                findings.push(
                    Finding::new("suspicious_package")
                        .with_path(path.to_string_lossy())
                        .with_severity(analysis.severity())
                        .with("package", name)
                        .with("risk_score", analysis.risk_score)
                        .with("strings_hits", json!(analysis.strings_hits))
                        .with("permissions_guess", json!(analysis.permissions_guess)),
                );
            }
        }
        Ok(ProbeOutput::batch(findings, events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scores_keyword_and_permission_hits() {
        let a = PackageAnalysis::of(b"classes.dex frida-agent android.permission.READ_SMS");
        assert_eq!(a.strings_hits, vec!["frida", "dex"]);
        assert_eq!(a.permissions_guess, vec!["android.permission", "READ_SMS"]);
        assert_eq!(a.risk_score, 2 * 10 + 2 * 8);
        assert_eq!(a.severity(), Severity::Medium);

        let clean = PackageAnalysis::of(b"hello world");
        assert_eq!(clean.risk_score, 0);
        assert_eq!(clean.severity(), Severity::Low);
    }

    #[test]
    fn score_is_capped() {
        let blob = format!("{} {}", KEYWORDS.join(" "), PERMISSIONS.join(" "));
        assert_eq!(PackageAnalysis::of(blob.as_bytes()).risk_score, 100);
    }

    #[test]
    fn unavailable_without_packages() {
        assert!(PackageProbe::build(&ProbesConfig::default()).is_err());
    }

    #[test]
    fn scans_configured_files_and_skips_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let apk = tmp.path().join("evil.apk");
        fs::write(&apk, b"PK..java.lang.Runtime.exec").unwrap();

        let probe = PackageProbe::new(vec![tmp.path().join("gone.apk"), apk]);
        let (findings, events) = probe.run(false).unwrap().into_parts("package");

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, "package_scanned");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].field("package").unwrap(), "evil.apk");
        // exec, java.lang.Runtime
        assert_eq!(findings[0].field("risk_score").unwrap(), 20);
    }
}
