//! Public API for configuration

pub mod loader;
pub mod model;
pub mod types;

// Re-export the main entrypoints:
pub use loader::{load, parse};
pub use model::{Config, ConfigError, CorrelatorMode, StoreBackend};
pub use types::ProbesConfig;
