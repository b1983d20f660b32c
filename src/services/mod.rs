//! Services - business logic and state management
//!
//! This module contains the core business logic services:
//! - `registry` - Zone lookup, classification, and GPIO-backed state
//! - `discovery` - Home Assistant discovery and state publication
//! - `router` - Central command router (single writer over zone state)
//! - `poll` - Debounced input polling loop
//! - `pulse` - Auto-off timers for momentary outputs

pub mod discovery;
pub mod poll;
pub mod pulse;
pub mod registry;
pub mod router;

// Re-export commonly used types
pub use discovery::DiscoverySynchronizer;
pub use poll::PollLoop;
pub use pulse::PulseController;
pub use registry::{Zone, ZoneRegistry};
pub use router::CommandRouter;
