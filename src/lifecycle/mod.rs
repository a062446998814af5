//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Compile filters → Start links → Accept upstream
//!
//! Reload (reload.rs):
//!     Watcher update → Swap settings → Recompile filters → Start new links
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Stop links → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then links, then the listener
//! - Startup config defects are fatal; reload defects are logged and skipped

pub mod reload;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use reload::ReloadCoordinator;
pub use shutdown::Shutdown;
pub use startup::{LinkHandle, Relay};
