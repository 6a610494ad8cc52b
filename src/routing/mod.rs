//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Read:
//!     Cluster::read
//!     → manager.pick_replica()
//!         - active replica set non-empty → random member
//!         - empty → pick_primary()
//!     → endpoint.query
//!
//! Write / transaction:
//!     Cluster::write_* / begin_transaction
//!     → manager.pick_primary() (primary connected, else unavailable)
//!     → endpoint.execute / query / begin
//! ```
//!
//! # Design Decisions
//! - Random choice over round-robin: stateless and safe under concurrent callers
//! - Reads fall back to the primary during replica outages
//! - Writes never fall back to a replica
//! - The active set is a snapshot; a replica going down stays routable until
//!   the next recomputation

pub mod manager;

pub use manager::ClusterManager;
