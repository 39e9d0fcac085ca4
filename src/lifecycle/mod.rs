//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Init tracing/metrics → Attach gateway → Bind
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Close transport → Tear down sessions → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop transport first, then sessions
//! - Every session teardown runs exactly once, even on shutdown

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
