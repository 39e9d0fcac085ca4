//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Gateway diagnostics:
//!     → logging.rs (LogHooks → tracing, stable message ids)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → Log aggregation (stdout via tracing-subscriber)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - The gateway core logs only through injected hooks
//! - Transport internals log through `tracing` directly
//! - Metrics are cheap (atomic increments), no-ops without an exporter

pub mod logging;
pub mod metrics;

pub use logging::{init_tracing, message_ids, LogFields, LogFn, LogHooks};
