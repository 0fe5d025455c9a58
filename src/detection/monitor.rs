//! Cycle scheduler.
//!
//! A `Monitor` owns the cadence of detection cycles:
//! - `run_once` runs one cycle synchronously on the caller's thread.
//! - `start` launches the single background loop: cycle, then sleep the
//!   interval in `tick`-sized slices, checking the stop flag between slices.
//! - `stop` raises the stop flag and waits (bounded) for the loop to exit.
//! - `run_for` is `start`, wait, `stop`.
//!
//! Cancellation is cooperative: a cycle in flight always finishes; only the
//! next one is prevented.

use std::{
    io,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, TryRecvError};
use log::Level;

use crate::agent_log;
use crate::comms::bus::EventBus;
use crate::config::model::MonitorSettings;
use crate::detection::engine::Engine;
use crate::detection::report::ReportSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Running,
    Stopped,
}

/// Handle on the background loop.
struct Worker {
    stop:   Arc<AtomicBool>,
    exited: Receiver<()>,
    handle: JoinHandle<()>,
}

impl Worker {
    fn has_exited(&self) -> bool {
        !matches!(self.exited.try_recv(), Err(TryRecvError::Empty))
    }
}

struct Inner {
    state:  MonitorState,
    worker: Option<Worker>,
    /// Loop that missed its stop deadline and is still finishing a cycle.
    lingering: Option<Worker>,
}

pub struct Monitor {
    engine:   Arc<Engine>,
    settings: MonitorSettings,
    cycles:   Arc<AtomicU64>,
    inner:    Mutex<Inner>,
}

impl Monitor {
    pub fn new(engine: Arc<Engine>, settings: MonitorSettings) -> Self {
        Self {
            engine,
            settings,
            cycles: Arc::new(AtomicU64::new(0)),
            inner: Mutex::new(Inner { state: MonitorState::Idle, worker: None, lingering: None }),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        // state stays consistent across a panic in another holder
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> MonitorState {
        self.inner().state
    }

    /// Cycles completed by the background loop since construction.
    pub fn cycles_completed(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// Run exactly one cycle on the calling thread. Does not touch the
    /// background loop or its state.
    pub fn run_once(&self) -> ReportSummary {
        let verbose = self.settings.verbose;
        if verbose {
            agent_log!(Level::Info, "monitor", "Running single detection cycle");
        }
        let result = run_one(&self.engine, verbose);
        if verbose {
            agent_log!(
                Level::Info,
                "monitor",
                "Result: ts={} findings={} events={}",
                result.timestamp,
                result.summary_count,
                result.events.len()
            );
        }
        result
    }

    /// Launch the background loop. Returns `Ok(false)` when a loop is
    /// already active, so repeated calls never create a second one.
    pub fn start(&self) -> io::Result<bool> {
        let mut inner = self.inner();
        if inner.state == MonitorState::Running {
            agent_log!(Level::Debug, "monitor", "start() ignored: already running");
            return Ok(false);
        }
        if let Some(old) = inner.lingering.take() {
            if !old.has_exited() {
                agent_log!(Level::Warn, "monitor", "start() refused: previous loop still finishing a cycle");
                inner.lingering = Some(old);
                return Ok(false);
            }
            let _ = old.handle.join();
        }

        let stop = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = channel::bounded::<()>(1);
        let engine = Arc::clone(&self.engine);
        let cycles = Arc::clone(&self.cycles);
        let settings = self.settings;
        let loop_stop = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("monitor-loop".into())
            .spawn(move || {
                agent_log!(Level::Info, "monitor", "Continuous monitor started (interval={:?})", settings.interval);
                while !loop_stop.load(Ordering::SeqCst) {
                    run_one(&engine, settings.verbose);
                    cycles.fetch_add(1, Ordering::SeqCst);
                    sleep_unless_stopped(&loop_stop, settings.interval, settings.tick);
                }
                agent_log!(Level::Info, "monitor", "Continuous monitor exited");
                let _ = done_tx.send(());
            })?;

        inner.worker = Some(Worker { stop, exited: done_rx, handle });
        inner.state = MonitorState::Running;
        Ok(true)
    }

    /// Signal the loop to exit and wait up to `stop_timeout` for it.
    /// Returns `true` when no loop is left running.
    pub fn stop(&self) -> bool {
        let mut inner = self.inner();
        let Some(worker) = inner.worker.take() else {
            return inner.lingering.as_ref().is_none_or(Worker::has_exited);
        };
        inner.state = MonitorState::Stopped;
        worker.stop.store(true, Ordering::SeqCst);

        match worker.exited.recv_timeout(self.settings.stop_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = worker.handle.join();
                agent_log!(Level::Info, "monitor", "Monitor stopped");
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                agent_log!(
                    Level::Warn,
                    "monitor",
                    "Loop did not exit within {:?}; it will stop after its current cycle",
                    self.settings.stop_timeout
                );
                inner.lingering = Some(worker);
                false
            }
        }
    }

    /// `start`, wait `duration`, `stop`.
    pub fn run_for(&self, duration: Duration) -> io::Result<()> {
        agent_log!(Level::Info, "monitor", "Monitor running for {:?}", duration);
        self.start()?;
        thread::sleep(duration);
        self.stop();
        Ok(())
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        if self.state() == MonitorState::Running {
            self.stop();
        }
    }
}

/// Each cycle gets a fresh bus, so no event outlives the cycle it was
/// emitted in.
fn run_one(engine: &Engine, verbose: bool) -> ReportSummary {
    let bus = EventBus::new();
    engine.run_cycle(&bus, verbose)
}

/// Sleep `total`, waking every `tick` to check `stop`.
fn sleep_unless_stopped(stop: &AtomicBool, total: Duration, tick: Duration) {
    let deadline = Instant::now() + total;
    while !stop.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(tick.min(deadline - now));
    }
}
