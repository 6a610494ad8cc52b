//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → FileConfig (validated, immutable)
//!
//! Programmatic use:
//!     ClusterConfig { primary, replicas, settings }
//!     → validation.rs (settings only)
//!     → Cluster::new
//! ```
//!
//! # Design Decisions
//! - Config is immutable once a cluster is built; changes require a new cluster
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Endpoint handles are never read from disk; drivers turn DSNs into handles

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{ClusterConfig, ClusterSettings, EndpointsConfig, FileConfig, ObservabilityConfig};
pub use validation::ValidationError;
