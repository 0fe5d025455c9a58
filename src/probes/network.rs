//! Socket probe: parses `ss -tunap` (or `netstat -tunap`) output and flags
//! connections whose remote address contains a configured prefix.

use crate::comms::events::{Finding, RawEvent, Severity};
use crate::config::types::ProbesConfig;
use crate::detection::probe::{Probe, ProbeOutput};
use crate::probes::walk::run_cmd;
use crate::agent_log;
use log::Level;

/// One parsed socket line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketEntry {
    pub raw:    String,
    pub state:  Option<String>,
    pub local:  Option<String>,
    pub remote: Option<String>,
}

/// Best-effort parse; the header line is skipped, short lines keep only `raw`.
pub fn parse_socket_table(txt: &str) -> Vec<SocketEntry> {
    txt.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .skip(1)
        .map(|ln| {
            let parts: Vec<&str> = ln.split_whitespace().collect();
            if parts.len() >= 5 {
                SocketEntry {
                    raw:    ln.to_string(),
                    state:  Some(parts[1].to_string()),
                    local:  Some(parts[3].to_string()),
                    remote: Some(parts[4].to_string()),
                }
            } else {
                SocketEntry { raw: ln.to_string(), state: None, local: None, remote: None }
            }
        })
        .collect()
}

pub struct NetworkProbe {
    prefixes: Vec<String>,
}

impl NetworkProbe {
    pub fn new(prefixes: Vec<String>) -> Self {
        Self { prefixes }
    }

    pub fn build(cfg: &ProbesConfig) -> anyhow::Result<Box<dyn Probe>> {
        Ok(Box::new(Self::new(cfg.network.remote_prefixes.clone())))
    }

    pub fn scan_table(&self, txt: &str) -> (Vec<Finding>, Vec<RawEvent>) {
        let mut findings = Vec::new();
        let mut events = Vec::new();
        for entry in parse_socket_table(txt) {
            let Some(remote) = entry.remote.as_deref() else { continue };
            if self.prefixes.iter().any(|p| remote.contains(p.as_str())) {
                let f = Finding::new("suspicious_connection")
                    .with_severity(Severity::High)
                    .with("remote", remote)
                    .with("raw", entry.raw.as_str());
                events.push(RawEvent::about("network_alert", &f));
                findings.push(f);
            }
        }
        (findings, events)
    }
}

impl Probe for NetworkProbe {
    fn name(&self) -> &str {
        "network"
    }

    fn run(&self, verbose: bool) -> anyhow::Result<ProbeOutput> {
        let Some(table) = run_cmd("ss", &["-tunap"]).or_else(|| run_cmd("netstat", &["-tunap"])) else {
            agent_log!(Level::Debug, "network", "no socket table available");
            return Ok(ProbeOutput::empty());
        };
        let (findings, events) = self.scan_table(&table);
        if verbose {
            for f in &findings {
                agent_log!(Level::Info, "network", "flagged {}", f.field("remote").and_then(|v| v.as_str()).unwrap_or_default());
            }
        }
        Ok(ProbeOutput::batch(findings, events))
    }
}
