// src/store/maintenance.rs
//! Periodic retention of stored reports.

use std::{sync::Arc, time::Duration};
use tokio::{runtime::Handle, task::JoinHandle};

use crate::agent_log;
use crate::store::ReportStore;
use log::Level;

/// Delete reports older than `now - ttl`; returns how many went away.
pub fn purge_expired(store: &dyn ReportStore, ttl: Duration) -> usize {
    let cutoff = chrono::Utc::now().timestamp() - ttl.as_secs() as i64;
    match store.purge_older_than(cutoff) {
        Ok(n) => {
            agent_log!(Level::Debug, "retention", "Removed {} report(s) before {}", n, cutoff);
            n
        }
        Err(e) => {
            agent_log!(Level::Warn, "retention", "Retention pass failed: {}", e);
            0
        }
    }
}

/// Run [`purge_expired`] every `period` on the given runtime.
/// Returns `None` when retention is disabled.
pub fn spawn_retention(
    rt: &Handle,
    store: Arc<dyn ReportStore>,
    ttl: Option<Duration>,
    period: Duration,
) -> Option<JoinHandle<()>> {
    let ttl = ttl?;
    Some(rt.spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let store = Arc::clone(&store);
            // store I/O is blocking
            let _ = tokio::task::spawn_blocking(move || purge_expired(store.as_ref(), ttl)).await;
        }
    }))
}
