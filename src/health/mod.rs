//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Per connection (monitor.rs):
//!     Periodic timer
//!     → probe.rs (select 1; raced against the probe timeout)
//!     → atomic `connected` flag
//!
//! Consumers:
//!     → routing manager (recomputes the active replica set)
//!     → Cluster::health (primary flag + active replicas)
//! ```
//!
//! # Design Decisions
//! - Health state is per-connection, a single atomic word
//! - A probe result replaces the flag outright; there is no hysteresis
//! - Probe failures never propagate to application callers

pub mod monitor;
pub mod probe;

pub use monitor::MonitoredConnection;
pub use probe::{Probe, ProbeOutcome, PROBE_STATEMENT};
