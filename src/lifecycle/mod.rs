//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     Validate settings → probe every endpoint once → spawn probe loops
//!     → compute active replicas → spawn recompute loop
//!
//! Shutdown (shutdown.rs):
//!     Cluster::shutdown → stop recompute loop
//!     → per connection: stop probe loop → close endpoint → mark down
//!     → final recompute (empty active set)
//! ```
//!
//! # Design Decisions
//! - Ordered startup: first health answer is known before the cluster is returned
//! - Ordered shutdown: loops stop before endpoints close
//! - Every stop is idempotent

pub mod shutdown;

pub use shutdown::Shutdown;
