//! In-memory event bus
//! ===================
//! Ordered append-only buffer shared between probes (producers) and the
//! cycle runner (single consumer). The consumer drains once per cycle;
//! a drained event is gone and is never handed out twice.
//!
//! Ordering is the total order in which `emit` calls acquire the lock.

use serde_json::{Map, Value};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

use crate::comms::events::Event;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("event bus lock poisoned")]
    Poisoned,
}

#[derive(Debug, Default)]
pub struct EventBus {
    events: Mutex<Vec<Event>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<Event>>, BusError> {
        self.events.lock().map_err(|_| BusError::Poisoned)
    }

    /// Append an event stamped with the current time.
    pub fn emit(&self, kind: impl Into<String>, data: Map<String, Value>) -> Result<(), BusError> {
        let evt = Event::stamped(kind.into(), data);
        self.lock()?.push(evt);
        Ok(())
    }

    /// Return every buffered event and leave the bus empty.
    pub fn drain(&self) -> Result<Vec<Event>, BusError> {
        Ok(std::mem::take(&mut *self.lock()?))
    }

    /// Snapshot without clearing.
    pub fn peek(&self) -> Result<Vec<Event>, BusError> {
        Ok(self.lock()?.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
