//! Cycle runner.
//!
//! One call to [`Engine::run_cycle`] is one detection cycle:
//! 1. Stamp the cycle and clear whatever is left on the bus
//! 2. Run every registered probe, in registration order
//! 3. Feed returned events into the bus, keep returned findings
//! 4. Correlate and append the correlator's findings
//! 5. Drain the bus and assemble the `ReportSummary`
//! 6. Hand the summary to the store when it holds anything
//!
//! Nothing inside a cycle escapes as an error: failing probes, a failing
//! correlator, a poisoned bus or a failing store are logged and downgraded.

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread,
    time::Instant,
};

use chrono::Utc;
use log::Level;
use metrics::{counter, histogram};

use crate::agent_log;
use crate::comms::bus::EventBus;
use crate::comms::events::Finding;
use crate::config::model::Config;
use crate::detection::correlator::{self, Correlator};
use crate::detection::probe::{Probe, ProbeOutput, ProbeRegistry};
use crate::detection::report::ReportSummary;
use crate::probes;
use crate::store::ReportStore;

pub struct Engine {
    registry:   ProbeRegistry,
    correlator: Box<dyn Correlator>,
    store:      Arc<dyn ReportStore>,
    parallel:   bool,
}

impl Engine {
    pub fn new(
        registry: ProbeRegistry,
        correlator: Box<dyn Correlator>,
        store: Arc<dyn ReportStore>,
    ) -> Self {
        Self { registry, correlator, store, parallel: false }
    }

    /// Wire the built-in probes and the configured correlator.
    pub fn from_config(cfg: &Config, store: Arc<dyn ReportStore>) -> Self {
        let registry = ProbeRegistry::build(probes::DESCRIPTORS, &cfg.probes);
        let correlator = correlator::from_settings(&cfg.correlator);
        agent_log!(Level::Info, "engine", "Engine ready: probes={:?}, correlator={}", registry, correlator.name());
        Self::new(registry, correlator, store).with_parallel_probes(cfg.engine.parallel_probes)
    }

    /// Run probes on scoped threads. Merge order stays registration order.
    pub fn with_parallel_probes(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn registry(&self) -> &ProbeRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn ReportStore> {
        &self.store
    }

    /// Execute one detection cycle and return its summary, persisted or not.
    pub fn run_cycle(&self, bus: &EventBus, verbose: bool) -> ReportSummary {
        let started = Instant::now();
        let ts = Utc::now().timestamp();
        counter!("cycles_total").increment(1);
        agent_log!(Level::Info, "engine", "Starting detection cycle {}", ts);

        match bus.drain() {
            Ok(stale) if !stale.is_empty() => {
                agent_log!(Level::Warn, "engine", "Discarding {} stale event(s) from a previous cycle", stale.len());
            }
            Ok(_) => {}
            Err(e) => agent_log!(Level::Warn, "engine", "EventBus drain failed: {}", e),
        }

        let mut findings: Vec<Finding> = Vec::new();
        for (name, outcome) in self.dispatch(verbose) {
            let Some(output) = outcome else { continue };
            let (probe_findings, events) = output.into_parts(name);
            if verbose {
                agent_log!(
                    Level::Info,
                    "engine",
                    "{}: {} finding(s), {} event(s)",
                    name,
                    probe_findings.len(),
                    events.len()
                );
            }
            findings.extend(probe_findings);
            for ev in events {
                if let Err(e) = bus.emit(ev.kind, ev.data) {
                    agent_log!(Level::Warn, "engine", "Dropping event from {}: {}", name, e);
                }
            }
        }

        let correlated = self.correlate(&findings);
        findings.extend(correlated);

        let events = bus.drain().unwrap_or_else(|e| {
            agent_log!(Level::Warn, "engine", "EventBus drain failed: {}", e);
            Vec::new()
        });

        let summary = ReportSummary::new(ts, findings, events);
        if summary.is_interesting() {
            self.persist(&summary);
        } else {
            agent_log!(Level::Info, "engine", "No findings this cycle");
        }

        histogram!("cycle_duration_seconds").record(started.elapsed().as_secs_f64());
        summary
    }

    /// Run every probe and pair each outcome with its probe name, in
    /// registration order.
    fn dispatch(&self, verbose: bool) -> Vec<(&str, Option<ProbeOutput>)> {
        let probes = self.registry.probes();
        if !self.parallel || probes.len() < 2 {
            return probes
                .iter()
                .map(|p| (p.name(), run_probe(&**p, verbose)))
                .collect();
        }

        thread::scope(|s| {
            let handles: Vec<_> = probes
                .iter()
                .map(|p| s.spawn(move || run_probe(&**p, verbose)))
                .collect();
            probes
                .iter()
                .zip(handles)
                .map(|(p, h)| (p.name(), h.join().unwrap_or(None)))
                .collect()
        })
    }

    fn correlate(&self, findings: &[Finding]) -> Vec<Finding> {
        let name = self.correlator.name();
        match panic::catch_unwind(AssertUnwindSafe(|| self.correlator.correlate(findings))) {
            Ok(Ok(c)) => {
                if let Some(score) = c.score {
                    agent_log!(Level::Info, "engine", "Correlator {} score: {}", name, score);
                }
                c.findings
            }
            Ok(Err(e)) => {
                agent_log!(Level::Warn, "engine", "Correlator error ({}): {:#}", name, e);
                Vec::new()
            }
            Err(p) => {
                agent_log!(Level::Warn, "engine", "Correlator {} panicked: {}", name, panic_message(&*p));
                Vec::new()
            }
        }
    }

    fn persist(&self, summary: &ReportSummary) {
        match self.store.exists(summary.timestamp) {
            Ok(true) => agent_log!(Level::Warn, "engine", "Replacing existing report {}", summary.timestamp),
            Ok(false) => {}
            Err(e) => agent_log!(Level::Debug, "engine", "Report lookup failed: {}", e),
        }
        match self.store.write(summary) {
            Ok(()) => counter!("reports_persisted_total").increment(1),
            Err(e) => agent_log!(Level::Error, "engine", "Failed to save report {}: {}", summary.timestamp, e),
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("registry", &self.registry)
            .field("correlator", &self.correlator.name())
            .field("parallel", &self.parallel)
            .finish()
    }
}

/// One isolated probe call: errors and panics both yield `None`.
fn run_probe(probe: &dyn Probe, verbose: bool) -> Option<ProbeOutput> {
    let name = probe.name();
    match panic::catch_unwind(AssertUnwindSafe(|| probe.run(verbose))) {
        Ok(Ok(output)) => Some(output),
        Ok(Err(e)) => {
            agent_log!(Level::Error, "engine", "Error running {}: {:#}", name, e);
            counter!("probe_failures_total", "probe" => name.to_string()).increment(1);
            None
        }
        Err(p) => {
            agent_log!(Level::Error, "engine", "Probe {} panicked: {}", name, panic_message(&*p));
            counter!("probe_failures_total", "probe" => name.to_string()).increment(1);
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".into()
    }
}
