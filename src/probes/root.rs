//! Root/superuser indicators: reports each configured path that exists.

use std::path::Path;

use crate::comms::events::{Finding, RawEvent, Severity};
use crate::config::types::ProbesConfig;
use crate::detection::probe::{Probe, ProbeOutput};
use crate::agent_log;
use log::Level;

pub struct RootProbe {
    indicators: Vec<String>,
}

impl RootProbe {
    pub fn new(indicators: Vec<String>) -> Self {
        Self { indicators }
    }

    pub fn build(cfg: &ProbesConfig) -> anyhow::Result<Box<dyn Probe>> {
        Ok(Box::new(Self::new(cfg.root.indicators.clone())))
    }
}

impl Probe for RootProbe {
    fn name(&self) -> &str {
        "root"
    }

    fn run(&self, verbose: bool) -> anyhow::Result<ProbeOutput> {
        let mut findings = Vec::new();
        let mut events = Vec::new();
        for p in self.indicators.iter().filter(|p| Path::new(p).exists()) {
            if verbose {
                agent_log!(Level::Info, "root", "indicator found {}", p);
            }
            let f = Finding::new("root_indicator")
                .with_path(p.as_str())
                .with_severity(Severity::Critical);
            events.push(RawEvent::about("root_detected", &f));
            findings.push(f);
        }
        Ok(ProbeOutput::batch(findings, events))
    }
}
