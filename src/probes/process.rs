//! Running-process probe: flags process listing lines that mention a
//! suspicious binary name as a standalone word.

use crate::comms::events::{Finding, RawEvent, Severity};
use crate::config::types::ProbesConfig;
use crate::detection::probe::{Probe, ProbeOutput};
use crate::probes::walk::run_cmd;
use crate::agent_log;
use log::Level;

pub struct ProcessProbe {
    names: Vec<String>,
}

impl ProcessProbe {
    pub fn new(names: Vec<String>) -> Self {
        Self { names: names.into_iter().map(|n| n.to_lowercase()).collect() }
    }

    pub fn build(cfg: &ProbesConfig) -> anyhow::Result<Box<dyn Probe>> {
        Ok(Box::new(Self::new(cfg.process.suspicious_names.clone())))
    }

    /// Match each listing line against the configured names.
    pub fn scan_listing(&self, listing: &str) -> (Vec<Finding>, Vec<RawEvent>) {
        let mut findings = Vec::new();
        let mut events = Vec::new();
        for ln in listing.lines() {
            let lower = ln.to_lowercase();
            let padded = format!(" {lower} ");
            let hit = self.names.iter().find(|s| {
                padded.contains(&format!(" {s} ")) || lower.starts_with(&format!("{s} "))
            });
            if let Some(name) = hit {
                let f = Finding::new("suspicious_process")
                    .with_line(ln.trim())
                    .with_severity(Severity::Medium)
                    .with("match", name.as_str());
                events.push(RawEvent::about("process_alert", &f));
                findings.push(f);
            }
        }
        (findings, events)
    }
}

impl Probe for ProcessProbe {
    fn name(&self) -> &str {
        "process"
    }

    fn run(&self, verbose: bool) -> anyhow::Result<ProbeOutput> {
        let Some(listing) = run_cmd("ps", &["aux"]).or_else(|| run_cmd("ps", &[])) else {
            agent_log!(Level::Debug, "process", "no process listing available");
            return Ok(ProbeOutput::empty());
        };
        let (findings, events) = self.scan_listing(&listing);
        if verbose {
            for f in &findings {
                agent_log!(Level::Info, "process", "suspicious: {}", f.line.as_deref().unwrap_or_default());
            }
        }
        Ok(ProbeOutput::batch(findings, events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
USER       PID %CPU %MEM    VSZ   RSS TTY      STAT START   TIME COMMAND
root         1  0.0  0.1  16900 11208 ?        Ss   09:00   0:01 /sbin/init
u0_a12    4242  0.0  0.0   2300   900 pts/0    S    09:12   0:00 sh -c nc 185.1.2.3 4444
u0_a12    4243  0.0  0.0   2300   900 pts/0    S    09:12   0:00 /usr/bin/bashful --help
busybox telnetd
";

    #[test]
    fn flags_standalone_names_only() {
        let probe = ProcessProbe::new(vec!["nc".into(), "BusyBox".into(), "bash".into()]);
        let (findings, events) = probe.scan_listing(LISTING);

        assert_eq!(findings.len(), 2);
        assert_eq!(events.len(), 2);
        assert!(findings[0].line.as_deref().unwrap().contains("nc 185.1.2.3"));
        assert_eq!(findings[0].kind, "suspicious_process");
        assert_eq!(findings[1].field("match").unwrap(), "busybox");
        assert_eq!(events[0].kind, "process_alert");
        assert_eq!(events[0].data["type"], "suspicious_process");
    }

    #[test]
    fn one_finding_per_line_even_with_several_names() {
        let probe = ProcessProbe::new(vec!["sh".into(), "nc".into()]);
        let (findings, _) = probe.scan_listing("sh -c nc host 1\n");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].field("match").unwrap(), "sh");
    }
}
