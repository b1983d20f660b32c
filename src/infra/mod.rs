//! Infrastructure - configuration and persistence
//!
//! - `config` - TOML configuration loading with defaults
//! - `persist` - crash-safe storage of zone-class overrides

pub mod config;
pub mod persist;

// Re-export commonly used types
pub use config::{Config, ZoneSpec};
pub use persist::PersistenceStore;
