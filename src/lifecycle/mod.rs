//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Master key → Build gateway → Start sweeper → Bind listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → server drains, sweeper and reload loop stop
//!     → credential store persisted → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listeners
//! - One broadcast channel reaches every long-running task

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{
    build_gateway, master_key_from_env, spawn_background_tasks, Components, StartupError,
};
