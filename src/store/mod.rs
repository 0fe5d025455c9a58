// src/store/mod.rs
//! Report persistence: the sink at the end of every cycle.
//!
//! Backends implement [`ReportStore`]; the engine only ever calls
//! [`ReportStore::write`], the remaining operations serve dashboards and
//! retention.

pub mod json_dir;
pub mod maintenance;
pub mod memory;
pub mod sqlite;

use std::sync::Arc;
use thiserror::Error;

use crate::config::model::{StoreBackend, StoreSettings};
use crate::detection::report::{ReportListing, ReportSummary};

pub use json_dir::JsonDirStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("store lock poisoned")]
    Poisoned,
}

/// Durable sink for report summaries, keyed by `timestamp`.
pub trait ReportStore: Send + Sync {
    fn exists(&self, ts: i64) -> Result<bool, StoreError>;

    /// Persist `report`, replacing any report with the same timestamp.
    fn write(&self, report: &ReportSummary) -> Result<(), StoreError>;

    fn read(&self, ts: i64) -> Result<Option<ReportSummary>, StoreError>;

    /// All stored reports, newest first.
    fn list(&self) -> Result<Vec<ReportListing>, StoreError>;

    /// Returns `true` if a report was removed.
    fn delete(&self, ts: i64) -> Result<bool, StoreError>;

    /// Remove reports older than `cutoff`; returns how many went away.
    fn purge_older_than(&self, cutoff: i64) -> Result<usize, StoreError>;
}

/// Open the backend selected in `[store]`.
pub fn open(cfg: &StoreSettings) -> Result<Arc<dyn ReportStore>, StoreError> {
    Ok(match cfg.backend {
        StoreBackend::Json => Arc::new(JsonDirStore::open(&cfg.dir)?),
        StoreBackend::Sqlite => Arc::new(SqliteStore::open(cfg)?),
    })
}
