//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Probe loops, recompute loop, façade:
//!     → tracing events (state transitions, close failures, routing failures)
//!     → metrics.rs (liveness gauges, timeout and routing counters)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout)
//!     → Prometheus scrape (when a binary installs the exporter)
//! ```
//!
//! # Design Decisions
//! - Structured fields name the connection (`primary`, `replica-N`)
//! - Probe failures log only on state transitions to keep steady state quiet

pub mod logging;
pub mod metrics;
