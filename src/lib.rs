//! Primary/replica SQL connection manager.
//!
//! Tracks the liveness of one primary and any number of replicas, routes reads
//! to a healthy replica (falling back to the primary) and sends every write and
//! transaction to the primary.
//!
//! ```text
//!                 ┌──────────────────────────────────────────────┐
//!   read ────────▶│ Cluster ──▶ ClusterManager ──▶ replica-N     │
//!   write/tx ────▶│                │           └──▶ primary      │
//!   health ──────▶│                │                             │
//!                 │     recompute loop      probe loop per conn  │
//!                 └──────────────────────────────────────────────┘
//! ```

pub mod cluster;
pub mod config;
pub mod driver;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod observability;
pub mod routing;

pub use cluster::{Cluster, ClusterHealth, Transaction};
pub use config::{ClusterConfig, ClusterSettings};
pub use driver::{DriverError, Endpoint, EndpointTransaction, Row, Value};
pub use error::{Error, Result};
