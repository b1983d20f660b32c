//! Domain models - core types for zones and commands
//!
//! This module contains the canonical data types used throughout the system:
//! - `ZoneClass` - the closed set of zone classes and their entity mapping
//! - `BehaviorGroup` / `EntityKind` - behavior and discovery-shape partitions
//! - `RouterEvent` - commands and edges consumed by the router
//! - `ZoneError` - rejection taxonomy for zone operations

pub mod types;

// Re-export commonly used types at module level
pub use types::{BehaviorGroup, EntityKind, RouterEvent, ZoneClass, ZoneError};
