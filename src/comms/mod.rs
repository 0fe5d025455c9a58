pub mod bus;
pub mod events;

pub use bus::{BusError, EventBus};
pub use events::{Event, Finding, RawEvent, Severity};
