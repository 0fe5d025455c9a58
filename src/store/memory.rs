//! In-process report store for dry runs and tests.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::detection::report::{ReportListing, ReportSummary};
use crate::store::{ReportStore, StoreError};

#[derive(Debug, Default)]
pub struct MemoryStore {
    reports: Mutex<BTreeMap<i64, ReportSummary>>,
    writes:  Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn reports(&self) -> Result<MutexGuard<'_, BTreeMap<i64, ReportSummary>>, StoreError> {
        self.reports.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Number of `write` calls seen, including overwrites.
    pub fn write_count(&self) -> usize {
        self.writes.lock().map(|n| *n).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.reports().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReportStore for MemoryStore {
    fn exists(&self, ts: i64) -> Result<bool, StoreError> {
        Ok(self.reports()?.contains_key(&ts))
    }

    fn write(&self, report: &ReportSummary) -> Result<(), StoreError> {
        self.reports()?.insert(report.timestamp, report.clone());
        *self.writes.lock().map_err(|_| StoreError::Poisoned)? += 1;
        Ok(())
    }

    fn read(&self, ts: i64) -> Result<Option<ReportSummary>, StoreError> {
        Ok(self.reports()?.get(&ts).cloned())
    }

    fn list(&self) -> Result<Vec<ReportListing>, StoreError> {
        Ok(self.reports()?.values().rev().map(ReportListing::from).collect())
    }

    fn delete(&self, ts: i64) -> Result<bool, StoreError> {
        Ok(self.reports()?.remove(&ts).is_some())
    }

    fn purge_older_than(&self, cutoff: i64) -> Result<usize, StoreError> {
        let mut reports = self.reports()?;
        let before = reports.len();
        reports.retain(|ts, _| *ts >= cutoff);
        Ok(before - reports.len())
    }
}
