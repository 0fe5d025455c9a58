//! Detection-cycle pipeline: probe contract, correlation, cycle runner and
//! scheduler.

pub mod correlator;
pub mod engine;
pub mod monitor;
pub mod probe;
pub mod report;

pub use correlator::{AggregatingCorrelator, Correlation, Correlator, WeightedCorrelator};
pub use engine::Engine;
pub use monitor::{Monitor, MonitorState};
pub use probe::{Probe, ProbeDescriptor, ProbeOutput, ProbeRegistry};
pub use report::{ReportListing, ReportSummary};
