//! Correlation stage.
//!
//! Turns the raw findings of a cycle into additional, higher-level findings.
//! Correlators are pure: the output depends only on the input slice and the
//! tables they were built with.

use std::collections::HashMap;

use serde_json::Value;

use crate::agent_log;
use crate::comms::events::{Finding, UNKNOWN_KIND};
use crate::config::model::{CorrelatorMode, CorrelatorSettings};
use log::Level;

/// Technique tag for types with no mapping.
pub const UNMAPPED_MITRE: &str = "T0000";

/// Weight for types with no entry in the weight table.
pub const DEFAULT_WEIGHT: u64 = 1;

const MITRE_TABLE: &[(&str, &str)] = &[
    ("suspicious_connection", "T1071"),
    ("suspicious_process",    "T1059"),
    ("suspicious_file",       "T1090"),
    ("persistence_file",      "T1547"),
    ("root_indicator",        "T1068"),
];

const WEIGHT_TABLE: &[(&str, u64)] = &[
    ("suspicious_connection", 5),
    ("suspicious_process",    6),
    ("suspicious_file",       4),
    ("persistence_file",      7),
    ("root_indicator",        9),
    ("anomaly",               3),
];

/// Result of one correlation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Correlation {
    /// Findings to append after the raw ones.
    pub findings: Vec<Finding>,
    /// Overall score, for correlators that compute one.
    pub score:    Option<u64>,
}

/// Swap point between raw findings and the report.
pub trait Correlator: Send + Sync {
    fn name(&self) -> &'static str;

    fn correlate(&self, findings: &[Finding]) -> anyhow::Result<Correlation>;
}

/// Groups findings by type; one `aggregated` finding per group with its
/// count and MITRE technique.
#[derive(Debug, Clone)]
pub struct AggregatingCorrelator {
    mitre: HashMap<String, String>,
}

impl AggregatingCorrelator {
    pub fn new() -> Self {
        Self::with_overrides(HashMap::new())
    }

    /// Built-in table extended (and overridden) by `overrides`.
    pub fn with_overrides(overrides: HashMap<String, String>) -> Self {
        let mut mitre: HashMap<String, String> = MITRE_TABLE
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        mitre.extend(overrides);
        Self { mitre }
    }

    pub fn mitre_for(&self, kind: &str) -> &str {
        self.mitre.get(kind).map(String::as_str).unwrap_or(UNMAPPED_MITRE)
    }
}

impl Default for AggregatingCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

impl Correlator for AggregatingCorrelator {
    fn name(&self) -> &'static str {
        "aggregate"
    }

    fn correlate(&self, findings: &[Finding]) -> anyhow::Result<Correlation> {
        // first-seen order of types, then counts
        let mut order: Vec<&str> = Vec::new();
        let mut counts: HashMap<&str, u64> = HashMap::new();
        for f in findings {
            let kind = if f.kind.is_empty() { UNKNOWN_KIND } else { f.kind.as_str() };
            let n = counts.entry(kind).or_insert(0);
            if *n == 0 {
                order.push(kind);
            }
            *n += 1;
        }

        let aggregated = order
            .into_iter()
            .map(|kind| {
                let agg = Finding::new("aggregated")
                    .with("category", kind)
                    .with("count", counts[kind])
                    .with("mitre", self.mitre_for(kind));
                agent_log!(Level::Debug, "correlator", "aggregated {} x{} ({})", kind, counts[kind], self.mitre_for(kind));
                agg
            })
            .collect();

        Ok(Correlation { findings: aggregated, score: None })
    }
}

/// Sums per-type weights into a score; one `correlated` finding per input.
#[derive(Debug, Clone)]
pub struct WeightedCorrelator {
    weights: HashMap<String, u64>,
}

impl WeightedCorrelator {
    pub fn new() -> Self {
        Self::with_overrides(HashMap::new())
    }

    pub fn with_overrides(overrides: HashMap<String, u64>) -> Self {
        let mut weights: HashMap<String, u64> = WEIGHT_TABLE
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect();
        weights.extend(overrides);
        Self { weights }
    }

    pub fn weight_for(&self, kind: &str) -> u64 {
        self.weights.get(kind).copied().unwrap_or(DEFAULT_WEIGHT)
    }
}

impl Default for WeightedCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

impl Correlator for WeightedCorrelator {
    fn name(&self) -> &'static str {
        "weighted"
    }

    fn correlate(&self, findings: &[Finding]) -> anyhow::Result<Correlation> {
        let mut score = 0u64;
        let mut correlated = Vec::with_capacity(findings.len());
        for f in findings {
            let weight = self.weight_for(&f.kind);
            score = score.saturating_add(weight);
            correlated.push(
                Finding::new("correlated")
                    .with("src", serde_json::to_value(f)?)
                    .with("weight", weight),
            );
        }
        agent_log!(Level::Debug, "correlator", "correlated score: {}", score);
        Ok(Correlation { findings: correlated, score: Some(score) })
    }
}

/// Build the correlator selected in configuration.
pub fn from_settings(cfg: &CorrelatorSettings) -> Box<dyn Correlator> {
    match cfg.mode {
        CorrelatorMode::Aggregate => Box::new(AggregatingCorrelator::with_overrides(cfg.mitre.clone())),
        CorrelatorMode::Weighted => Box::new(WeightedCorrelator::with_overrides(cfg.weights.clone())),
    }
}

/// Count carried by an `aggregated` finding.
pub fn count_of(f: &Finding) -> Option<u64> {
    f.field("count").and_then(Value::as_u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kinds(list: &[&str]) -> Vec<Finding> {
        list.iter().map(|k| Finding::new(*k)).collect()
    }

    #[test]
    fn one_aggregate_per_distinct_type_in_first_seen_order() {
        let input = kinds(&["root_indicator", "anomaly", "root_indicator", "custom", "anomaly", "root_indicator"]);
        let out = AggregatingCorrelator::new().correlate(&input).unwrap();

        let got: Vec<(String, u64, String)> = out
            .findings
            .iter()
            .map(|f| {
                assert_eq!(f.kind, "aggregated");
                (
                    f.field("category").unwrap().as_str().unwrap().to_string(),
                    count_of(f).unwrap(),
                    f.field("mitre").unwrap().as_str().unwrap().to_string(),
                )
            })
            .collect();
        assert_eq!(
            got,
            vec![
                ("root_indicator".into(), 3, "T1068".into()),
                ("anomaly".into(), 2, UNMAPPED_MITRE.into()),
                ("custom".into(), 1, UNMAPPED_MITRE.into()),
            ]
        );
        assert_eq!(out.score, None);
    }

    #[test]
    fn aggregate_of_nothing_is_nothing() {
        let out = AggregatingCorrelator::new().correlate(&[]).unwrap();
        assert!(out.findings.is_empty());
    }

    #[test]
    fn mitre_overrides_extend_the_table() {
        let c = AggregatingCorrelator::with_overrides(HashMap::from([
            ("anomaly".to_string(), "T1496".to_string()),
            ("root_indicator".to_string(), "T1548".to_string()),
        ]));
        assert_eq!(c.mitre_for("anomaly"), "T1496");
        assert_eq!(c.mitre_for("root_indicator"), "T1548");
        assert_eq!(c.mitre_for("suspicious_process"), "T1059");
    }

    #[test]
    fn weighted_sums_known_and_default_weights() {
        let input = kinds(&["root_indicator", "suspicious_process", "mystery"]);
        let out = WeightedCorrelator::new().correlate(&input).unwrap();

        assert_eq!(out.score, Some(9 + 6 + DEFAULT_WEIGHT));
        assert_eq!(out.findings.len(), 3);
        assert_eq!(out.findings[0].kind, "correlated");
        assert_eq!(out.findings[0].field("weight"), Some(&json!(9)));
        assert_eq!(out.findings[2].field("src"), Some(&json!({"type": "mystery"})));
    }

    #[test]
    fn correlation_is_pure() {
        let input = kinds(&["anomaly", "persistence_file"]);
        let c = WeightedCorrelator::new();
        assert_eq!(c.correlate(&input).unwrap(), c.correlate(&input).unwrap());
    }
}
