//! Probe contract and registry.
//!
//! A probe is an independent, stateless detection routine. The registry is a
//! fixed, ordered list of probes that were successfully built at startup;
//! a probe whose construction failed is simply absent.

use serde_json::Value;

use crate::agent_log;
use crate::comms::events::{Finding, RawEvent, UNKNOWN_KIND};
use crate::config::types::ProbesConfig;
use log::Level;

/// Uniform "run once" capability every probe provides.
pub trait Probe: Send + Sync {
    /// Stable name used in logs, metrics and synthetic findings.
    fn name(&self) -> &str;

    fn run(&self, verbose: bool) -> anyhow::Result<ProbeOutput>;
}

/// What a probe hands back. Probes evolved separately, so three shapes are
/// accepted and normalised by [`ProbeOutput::into_parts`].
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutput {
    /// Findings plus side-channel events.
    Batch { findings: Vec<Finding>, events: Vec<RawEvent> },
    /// A bare list of findings.
    Findings(Vec<Finding>),
    /// A single opaque value; recorded as a synthetic finding when non-empty.
    Opaque(Value),
}

impl ProbeOutput {
    pub fn empty() -> Self {
        ProbeOutput::Batch { findings: Vec::new(), events: Vec::new() }
    }

    pub fn batch(findings: Vec<Finding>, events: Vec<RawEvent>) -> Self {
        ProbeOutput::Batch { findings, events }
    }

    /// Split into findings and events. `probe` names the source of a
    /// synthetic finding built from an opaque value.
    pub fn into_parts(self, probe: &str) -> (Vec<Finding>, Vec<RawEvent>) {
        match self {
            ProbeOutput::Batch { findings, events } => (findings, events),
            ProbeOutput::Findings(findings) => (findings, Vec::new()),
            ProbeOutput::Opaque(value) if is_truthy(&value) => {
                let result = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                let synthetic = Finding::new(UNKNOWN_KIND)
                    .with_module(probe)
                    .with("result", result);
                (vec![synthetic], Vec::new())
            }
            ProbeOutput::Opaque(_) => (Vec::new(), Vec::new()),
        }
    }
}

/// Empty strings, empty containers, null, false and zero carry nothing.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Static description of a probe: its name and how to build it.
pub struct ProbeDescriptor {
    pub name:  &'static str,
    pub build: fn(&ProbesConfig) -> anyhow::Result<Box<dyn Probe>>,
}

impl std::fmt::Debug for ProbeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeDescriptor").field("name", &self.name).finish()
    }
}

/// Ordered set of constructed probes.
#[derive(Default)]
pub struct ProbeRegistry {
    probes: Vec<Box<dyn Probe>>,
}

impl ProbeRegistry {
    /// Build every enabled descriptor in order. Construction failures are
    /// logged and leave the probe out.
    pub fn build(descriptors: &[ProbeDescriptor], cfg: &ProbesConfig) -> Self {
        let mut probes = Vec::with_capacity(descriptors.len());
        for desc in descriptors {
            if !cfg.is_enabled(desc.name) {
                agent_log!(Level::Debug, "registry", "Probe {} disabled by config", desc.name);
                continue;
            }
            match (desc.build)(cfg) {
                Ok(probe) => probes.push(probe),
                Err(e) => agent_log!(Level::Warn, "registry", "Probe not available: {} ({:#})", desc.name, e),
            }
        }
        agent_log!(Level::Info, "registry", "{} probe(s) registered", probes.len());
        Self { probes }
    }

    /// Use an already-built list, kept in the given order.
    pub fn from_probes(probes: Vec<Box<dyn Probe>>) -> Self {
        Self { probes }
    }

    pub fn probes(&self) -> &[Box<dyn Probe>] {
        &self.probes
    }

    pub fn names(&self) -> Vec<&str> {
        self.probes.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }
}

impl std::fmt::Debug for ProbeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
