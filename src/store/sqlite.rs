// src/store/sqlite.rs
//! SQLite-backed report store (WAL journal, tunable sync).
//!
//! Each report is one row; the full summary is kept as JSON in `body`, the
//! listing columns are denormalised so `list()` never parses bodies.

use std::{
    fs,
    path::Path,
    sync::{Mutex, MutexGuard},
    thread::sleep,
    time::Duration,
};

use rusqlite::{params, Connection, OptionalExtension};

use crate::agent_log;
use crate::comms::events::Severity;
use crate::config::model::StoreSettings;
use crate::detection::report::{ReportListing, ReportSummary};
use crate::store::{ReportStore, StoreError};
use log::Level;

const MAX_LOCK_RETRIES: u64 = 5;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

/// Open a connection in WAL mode with the configured sync level.
pub fn open_db_connection(path: &Path, synchronous: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_millis(1_000))?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", synchronous)?;
    Ok(conn)
}

impl SqliteStore {
    /// Open (and on first run initialise) the database at `cfg.db_path`.
    pub fn open(cfg: &StoreSettings) -> Result<Self, StoreError> {
        if let Some(parent) = cfg.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = open_db_connection(&cfg.db_path, &cfg.synchronous)?;
        conn.pragma_update(None, "journal_size_limit", cfg.journal_size_limit as i64)?;
        let store = Self::with_connection(conn)?;
        agent_log!(Level::Info, "store", "Database ready at {}", cfg.db_path.display());
        Ok(store)
    }

    /// Wrap an existing connection and apply the schema.
    pub fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        let schema = include_str!("../../resources/schema.sql");
        conn.execute_batch(schema)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Private in-memory database.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn is_locked(e: &rusqlite::Error) -> bool {
    e.to_string().contains("database is locked")
}

impl ReportStore for SqliteStore {
    fn exists(&self, ts: i64) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let found = conn
            .query_row("SELECT 1 FROM reports WHERE ts = ?1", [ts], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    /// Single-row upsert with retry + backoff while the database is locked.
    fn write(&self, report: &ReportSummary) -> Result<(), StoreError> {
        let body = serde_json::to_string(report)?;
        let severity = report.highest_severity().to_string();
        let mut conn = self.lock()?;
        let mut attempts = 0;

        loop {
            let result = conn.transaction().and_then(|tx| {
                tx.execute(
                    "INSERT OR REPLACE INTO reports \
                       (ts, summary_count, event_count, highest_severity, body) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        report.timestamp,
                        report.summary_count as i64,
                        report.events.len() as i64,
                        severity,
                        body,
                    ],
                )?;
                tx.commit()
            });
            match result {
                Ok(()) => break,
                Err(e) if is_locked(&e) && attempts < MAX_LOCK_RETRIES => {
                    attempts += 1;
                    sleep(Duration::from_millis(50 * attempts));
                }
                Err(e) => return Err(e.into()),
            }
        }
        agent_log!(Level::Info, "store", "Saved report {} ({} findings)", report.timestamp, report.summary_count);
        Ok(())
    }

    fn read(&self, ts: i64) -> Result<Option<ReportSummary>, StoreError> {
        let conn = self.lock()?;
        let body: Option<String> = conn
            .query_row("SELECT body FROM reports WHERE ts = ?1", [ts], |r| r.get(0))
            .optional()?;
        body.map(|b| serde_json::from_str(&b).map_err(StoreError::from))
            .transpose()
    }

    fn list(&self) -> Result<Vec<ReportListing>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT ts, summary_count, highest_severity FROM reports ORDER BY ts DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (timestamp, count, severity) = row?;
            out.push(ReportListing {
                timestamp,
                summary_count: count.max(0) as usize,
                highest_severity: severity.parse().unwrap_or(Severity::Low),
            });
        }
        Ok(out)
    }

    fn delete(&self, ts: i64) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        Ok(conn.execute("DELETE FROM reports WHERE ts = ?1", [ts])? > 0)
    }

    fn purge_older_than(&self, cutoff: i64) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM reports WHERE ts < ?1", [cutoff])?;
        if let Err(e) = conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);") {
            agent_log!(Level::Warn, "store", "WAL checkpoint failed: {}", e);
        }
        Ok(removed)
    }
}
