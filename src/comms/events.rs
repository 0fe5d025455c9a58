//! Unified finding/event model used across the agent.
//!
//! This module defines the evidence types that flow through a detection
//! cycle: `Finding`s returned by probes or produced by a correlator, and
//! `Event`s emitted on the in-memory bus.
//!
//! ## Purpose
//! These types are used to:
//! - Normalize heterogeneous probe output into one pipeline
//! - Feed the correlator
//! - Persist report summaries through a `ReportStore`
//! - Render in the dashboard or export externally
//!
//! ## Format
//! Everything is plain `serde` JSON. A `Finding` keeps its well-known keys
//! as typed fields and carries any other key in a flattened map, so probes
//! can attach whatever context they have without a schema change.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Kind used when a probe did not say what it found.
pub const UNKNOWN_KIND: &str = "unknown";

/// Severity attached to a finding, ordered from least to most severe.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity { Low, Medium, High, Critical }

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low"      => Ok(Severity::Low),
            "medium"   => Ok(Severity::Medium),
            "high"     => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other      => Err(format!("invalid severity '{other}'")),
        }
    }
}

/// A discrete piece of detection evidence.
///
/// Identity is structural: two findings are the same finding when every
/// field, free-form ones included, is equal.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Finding {
    #[serde(rename = "type", default = "unknown_kind")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Any key not covered above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn unknown_kind() -> String { UNKNOWN_KIND.into() }

impl Finding {
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into(), ..Default::default() }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_line(mut self, line: impl Into<String>) -> Self {
        self.line = Some(line.into());
        self
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    /// Attach a free-form field.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Look up a free-form field.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// The finding as a JSON object, used as event payload.
    pub fn to_data(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

/// An event as a probe hands it back: no timestamp yet.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RawEvent {
    #[serde(rename = "type", default = "unknown_kind")]
    pub kind: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl RawEvent {
    pub fn new(kind: impl Into<String>, data: Map<String, Value>) -> Self {
        Self { kind: kind.into(), data }
    }

    /// Event carrying a copy of `finding` as payload.
    pub fn about(kind: impl Into<String>, finding: &Finding) -> Self {
        Self::new(kind, finding.to_data())
    }
}

/// A timestamped, typed side-channel signal as stored on the bus.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Map<String, Value>,
    /// Seconds since the UNIX epoch, assigned at emission.
    pub timestamp: i64,
}

impl Event {
    pub(crate) fn stamped(kind: String, data: Map<String, Value>) -> Self {
        Self { kind, data, timestamp: Utc::now().timestamp() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn finding_keeps_free_form_fields_flat() {
        let f = Finding::new("suspicious_process")
            .with_line("sh -c id")
            .with("pid", 42);
        let v = serde_json::to_value(&f).unwrap();
        assert_eq!(v, json!({"type": "suspicious_process", "line": "sh -c id", "pid": 42}));

        let back: Finding = serde_json::from_value(v).unwrap();
        assert_eq!(back, f);
        assert_eq!(back.field("pid"), Some(&json!(42)));
    }

    #[test]
    fn finding_without_type_is_unknown() {
        let f: Finding = serde_json::from_value(json!({"module": "x", "result": "1"})).unwrap();
        assert_eq!(f.kind, UNKNOWN_KIND);
        assert_eq!(f.module.as_deref(), Some("x"));
    }

    #[test]
    fn severity_orders_and_parses() {
        assert!(Severity::Critical > Severity::High);
        assert_eq!("HIGH".parse::<Severity>(), Ok(Severity::High));
        assert!("urgent".parse::<Severity>().is_err());
    }
}
