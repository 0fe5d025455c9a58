//! The single artifact a cycle produces.

use serde::{Deserialize, Serialize};

use crate::comms::events::{Event, Finding, Severity};

/// Outcome of one detection cycle, handed to the report store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Cycle start, seconds since the UNIX epoch. Also the store key.
    pub timestamp:     i64,
    /// `findings.len()` at creation, correlator output included.
    pub summary_count: usize,
    pub findings:      Vec<Finding>,
    pub events:        Vec<Event>,
}

impl ReportSummary {
    pub fn new(timestamp: i64, findings: Vec<Finding>, events: Vec<Event>) -> Self {
        Self { timestamp, summary_count: findings.len(), findings, events }
    }

    /// Worth persisting: at least one finding or event.
    pub fn is_interesting(&self) -> bool {
        self.summary_count > 0 || !self.events.is_empty()
    }

    /// Highest severity among findings, `Low` when none carry one.
    pub fn highest_severity(&self) -> Severity {
        self.findings
            .iter()
            .filter_map(|f| f.severity)
            .max()
            .unwrap_or(Severity::Low)
    }
}

/// Listing row for dashboards: enough to render an index without loading
/// every report body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportListing {
    pub timestamp:        i64,
    pub summary_count:    usize,
    pub highest_severity: Severity,
}

impl From<&ReportSummary> for ReportListing {
    fn from(r: &ReportSummary) -> Self {
        Self {
            timestamp:        r.timestamp,
            summary_count:    r.summary_count,
            highest_severity: r.highest_severity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_tracks_findings_and_severity_defaults_low() {
        let r = ReportSummary::new(10, vec![Finding::new("a"), Finding::new("b")], vec![]);
        assert_eq!(r.summary_count, 2);
        assert!(r.is_interesting());
        assert_eq!(r.highest_severity(), Severity::Low);

        let empty = ReportSummary::new(11, vec![], vec![]);
        assert!(!empty.is_interesting());
    }

    #[test]
    fn listing_picks_highest_severity() {
        let r = ReportSummary::new(
            12,
            vec![
                Finding::new("a").with_severity(Severity::Medium),
                Finding::new("b").with_severity(Severity::Critical),
                Finding::new("c"),
            ],
            vec![],
        );
        let row = ReportListing::from(&r);
        assert_eq!(row.highest_severity, Severity::Critical);
        assert_eq!(row.summary_count, 3);
        assert_eq!(row.timestamp, 12);
    }
}
