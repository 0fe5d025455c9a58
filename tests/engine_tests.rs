// tests/engine_tests.rs

//! End-to-end detection cycles against scripted probes.
//!
//! Covers:
//! - Failure isolation (errors and panics in one probe never cost the others)
//! - Correlator output appended after probe findings
//! - Event drain semantics and timestamps
//! - Persistence only for non-empty cycles, and resilience to store failures

use std::{io, sync::Arc, thread::sleep, time::Duration};

use anyhow::anyhow;
use serde_json::{json, Map, Value};

use watchpost::{
    comms::{
        bus::EventBus,
        events::{Finding, RawEvent, Severity, UNKNOWN_KIND},
    },
    detection::{
        correlator::{count_of, UNMAPPED_MITRE},
        report::{ReportListing, ReportSummary},
        AggregatingCorrelator, Correlation, Correlator, Engine, Probe, ProbeOutput, ProbeRegistry,
        WeightedCorrelator,
    },
    store::{MemoryStore, ReportStore, StoreError},
};

/// Returns the same output every run.
struct Scripted {
    name:   &'static str,
    output: ProbeOutput,
    delay:  Duration,
}

impl Scripted {
    fn new(name: &'static str, output: ProbeOutput) -> Box<dyn Probe> {
        Box::new(Self { name, output, delay: Duration::ZERO })
    }

    fn slow(name: &'static str, output: ProbeOutput, delay: Duration) -> Box<dyn Probe> {
        Box::new(Self { name, output, delay })
    }
}

impl Probe for Scripted {
    fn name(&self) -> &str {
        self.name
    }

    fn run(&self, _verbose: bool) -> anyhow::Result<ProbeOutput> {
        sleep(self.delay);
        Ok(self.output.clone())
    }
}

struct Failing;

impl Probe for Failing {
    fn name(&self) -> &str {
        "failing"
    }

    fn run(&self, _verbose: bool) -> anyhow::Result<ProbeOutput> {
        Err(anyhow!("tool missing"))
    }
}

struct Exploding;

impl Probe for Exploding {
    fn name(&self) -> &str {
        "exploding"
    }

    fn run(&self, _verbose: bool) -> anyhow::Result<ProbeOutput> {
        panic!("probe exploded")
    }
}

struct BrokenCorrelator {
    panics: bool,
}

impl Correlator for BrokenCorrelator {
    fn name(&self) -> &'static str {
        "broken"
    }

    fn correlate(&self, _findings: &[Finding]) -> anyhow::Result<Correlation> {
        if self.panics {
            panic!("correlator exploded");
        }
        Err(anyhow!("rule table corrupt"))
    }
}

/// Every write fails.
struct ReadOnlyStore;

impl ReportStore for ReadOnlyStore {
    fn exists(&self, _ts: i64) -> Result<bool, StoreError> {
        Ok(false)
    }
    fn write(&self, _report: &ReportSummary) -> Result<(), StoreError> {
        Err(StoreError::Io(io::Error::other("read-only filesystem")))
    }
    fn read(&self, _ts: i64) -> Result<Option<ReportSummary>, StoreError> {
        Ok(None)
    }
    fn list(&self) -> Result<Vec<ReportListing>, StoreError> {
        Ok(Vec::new())
    }
    fn delete(&self, _ts: i64) -> Result<bool, StoreError> {
        Ok(false)
    }
    fn purge_older_than(&self, _cutoff: i64) -> Result<usize, StoreError> {
        Ok(0)
    }
}

fn boxed(probe: impl Probe + 'static) -> Box<dyn Probe> {
    Box::new(probe)
}

fn batch(findings: Vec<Finding>, events: Vec<RawEvent>) -> ProbeOutput {
    ProbeOutput::batch(findings, events)
}

fn data(pairs: Value) -> Map<String, Value> {
    match pairs {
        Value::Object(m) => m,
        _ => Map::new(),
    }
}

fn engine(probes: Vec<Box<dyn Probe>>, store: Arc<MemoryStore>) -> Engine {
    Engine::new(
        ProbeRegistry::from_probes(probes),
        Box::new(AggregatingCorrelator::new()),
        store,
    )
}

#[test]
fn failing_probes_are_isolated_and_aggregates_follow() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine(
        vec![
            Scripted::new("root", batch(vec![Finding::new("root_indicator").with_path("/sbin/su")], vec![])),
            boxed(Failing),
            boxed(Exploding),
            Scripted::new("process", batch(vec![Finding::new("suspicious_process").with_line("nc -l")], vec![])),
        ],
        Arc::clone(&store),
    );

    let summary = engine.run_cycle(&EventBus::new(), false);

    assert_eq!(summary.summary_count, 4);
    assert_eq!(summary.findings.len(), 4);
    assert_eq!(summary.findings[0].kind, "root_indicator");
    assert_eq!(summary.findings[1].kind, "suspicious_process");

    let aggs = &summary.findings[2..];
    assert!(aggs.iter().all(|f| f.kind == "aggregated"));
    assert_eq!(aggs[0].field("category").unwrap(), "root_indicator");
    assert_eq!(aggs[0].field("mitre").unwrap(), "T1068");
    assert_eq!(aggs[1].field("category").unwrap(), "suspicious_process");
    assert_eq!(aggs[1].field("mitre").unwrap(), "T1059");
    assert!(aggs.iter().all(|f| count_of(f) == Some(1)));

    assert_eq!(store.write_count(), 1);
    assert_eq!(store.read(summary.timestamp).unwrap(), Some(summary));
}

#[test]
fn empty_cycle_is_not_persisted() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine(
        vec![
            Scripted::new("quiet", ProbeOutput::empty()),
            Scripted::new("bare", ProbeOutput::Findings(vec![])),
            Scripted::new("opaque", ProbeOutput::Opaque(Value::Null)),
        ],
        Arc::clone(&store),
    );

    let summary = engine.run_cycle(&EventBus::new(), false);

    assert_eq!(summary.summary_count, 0);
    assert!(summary.findings.is_empty());
    assert!(summary.events.is_empty());
    assert_eq!(store.write_count(), 0);
}

#[test]
fn events_are_drained_in_order_and_stamped() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine(
        vec![
            Scripted::new("a", batch(vec![], vec![RawEvent::new("first", data(json!({"n": 1})))])),
            Scripted::new("b", batch(vec![], vec![
                RawEvent::new("second", data(json!({"n": 2}))),
                RawEvent::new("third", Map::new()),
            ])),
        ],
        Arc::clone(&store),
    );
    let bus = EventBus::new();

    let summary = engine.run_cycle(&bus, true);

    let kinds: Vec<_> = summary.events.iter().map(|e| e.kind.as_str()).collect();
    assert_eq!(kinds, ["first", "second", "third"]);
    assert_eq!(summary.events[1].data["n"], 2);
    assert!(summary.events.iter().all(|e| e.timestamp >= summary.timestamp));
    assert!(bus.is_empty());
    // events alone make a cycle worth keeping
    assert_eq!(summary.summary_count, 0);
    assert_eq!(store.write_count(), 1);
}

#[test]
fn stale_bus_events_are_discarded() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine(vec![Scripted::new("quiet", ProbeOutput::empty())], Arc::clone(&store));
    let bus = EventBus::new();
    bus.emit("leftover", Map::new()).unwrap();

    let summary = engine.run_cycle(&bus, false);

    assert!(summary.events.is_empty());
    assert!(bus.is_empty());
    assert_eq!(store.write_count(), 0);
}

#[test]
fn correlator_failure_keeps_probe_findings() {
    for panics in [false, true] {
        let store = Arc::new(MemoryStore::new());
        let engine = Engine::new(
            ProbeRegistry::from_probes(vec![Scripted::new(
                "file",
                batch(vec![Finding::new("suspicious_file").with_path("/sdcard/payload")], vec![]),
            )]),
            Box::new(BrokenCorrelator { panics }),
            store.clone(),
        );

        let summary = engine.run_cycle(&EventBus::new(), false);

        assert_eq!(summary.summary_count, 1);
        assert_eq!(summary.findings[0].kind, "suspicious_file");
        assert_eq!(store.write_count(), 1);
    }
}

#[test]
fn store_failure_still_returns_summary() {
    let engine = Engine::new(
        ProbeRegistry::from_probes(vec![Scripted::new(
            "root",
            batch(vec![Finding::new("root_indicator").with_severity(Severity::Critical)], vec![]),
        )]),
        Box::new(AggregatingCorrelator::new()),
        Arc::new(ReadOnlyStore),
    );

    let summary = engine.run_cycle(&EventBus::new(), false);

    assert_eq!(summary.summary_count, 2);
    assert_eq!(summary.highest_severity(), Severity::Critical);
}

#[test]
fn opaque_output_becomes_unknown_finding() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine(
        vec![Scripted::new("legacy", ProbeOutput::Opaque(json!("rooted")))],
        Arc::clone(&store),
    );

    let summary = engine.run_cycle(&EventBus::new(), false);

    assert_eq!(summary.summary_count, 2);
    let synthetic = &summary.findings[0];
    assert_eq!(synthetic.kind, UNKNOWN_KIND);
    assert_eq!(synthetic.module.as_deref(), Some("legacy"));
    assert_eq!(synthetic.field("result").unwrap(), "rooted");
    assert_eq!(summary.findings[1].field("category").unwrap(), UNKNOWN_KIND);
    assert_eq!(summary.findings[1].field("mitre").unwrap(), UNMAPPED_MITRE);
}

#[test]
fn parallel_probes_merge_in_registration_order() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine(
        vec![
            Scripted::slow("slow", batch(vec![Finding::new("first")], vec![]), Duration::from_millis(80)),
            boxed(Exploding),
            Scripted::new("fast", batch(vec![Finding::new("second")], vec![])),
        ],
        Arc::clone(&store),
    )
    .with_parallel_probes(true);

    let summary = engine.run_cycle(&EventBus::new(), false);

    let kinds: Vec<_> = summary.findings.iter().map(|f| f.kind.as_str()).collect();
    assert_eq!(kinds, ["first", "second", "aggregated", "aggregated"]);
}

#[test]
fn weighted_correlator_appends_one_entry_per_finding() {
    let store = Arc::new(MemoryStore::new());
    let engine = Engine::new(
        ProbeRegistry::from_probes(vec![Scripted::new(
            "mixed",
            batch(vec![Finding::new("root_indicator"), Finding::new("anomaly")], vec![]),
        )]),
        Box::new(WeightedCorrelator::new()),
        store.clone(),
    );

    let summary = engine.run_cycle(&EventBus::new(), false);

    assert_eq!(summary.summary_count, 4);
    assert_eq!(summary.findings[2].kind, "correlated");
    assert_eq!(summary.findings[2].field("weight").unwrap(), 9);
    assert_eq!(summary.findings[3].field("weight").unwrap(), 3);
}
