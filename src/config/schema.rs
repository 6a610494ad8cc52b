//! Configuration schema definitions.
//!
//! This module defines the tunables of a cluster and the on-disk file layout.
//! All file types derive Serde traits for deserialization from TOML.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::driver::Endpoint;

/// Root of a configuration file.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct FileConfig {
    /// Probe and routing tunables.
    pub cluster: ClusterSettings,

    /// Connection strings for drivers that open their own endpoints.
    pub endpoints: EndpointsConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,
}

/// Probe and routing tunables shared by every connection in a cluster.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClusterSettings {
    /// Upper bound on one liveness probe, in milliseconds.
    pub probe_timeout_ms: u64,

    /// Interval between liveness probes of each connection, in milliseconds.
    pub health_check_interval_ms: u64,

    /// Interval between active-replica recomputations, in milliseconds.
    /// Defaults to half the health check interval.
    pub replica_refresh_ms: Option<u64>,

    /// Prefix statements with a `/* file:line:col */` comment naming the caller.
    pub annotate_queries: bool,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 1_000,
            health_check_interval_ms: 5_000,
            replica_refresh_ms: None,
            annotate_queries: true,
        }
    }
}

impl ClusterSettings {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub fn replica_refresh_interval(&self) -> Duration {
        match self.replica_refresh_ms {
            Some(ms) => Duration::from_millis(ms),
            None => self.health_check_interval() / 2,
        }
    }
}

/// Connection strings for the primary and its replicas.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EndpointsConfig {
    /// Primary DSN (e.g., "postgres://app@db-primary:5432/app").
    pub primary: String,

    /// Replica DSNs, in routing order.
    pub replicas: Vec<String>,

    /// Maximum pooled sessions per endpoint, for pooling drivers.
    pub max_sessions: u32,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            primary: String::new(),
            replicas: Vec::new(),
            max_sessions: 8,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log filter used when RUST_LOG is unset (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Everything needed to build a [`crate::Cluster`].
#[derive(Clone)]
pub struct ClusterConfig {
    /// The single writable endpoint.
    pub primary: Arc<dyn Endpoint>,

    /// Read-only endpoints, zero or more.
    pub replicas: Vec<Arc<dyn Endpoint>>,

    pub settings: ClusterSettings,
}

impl ClusterConfig {
    /// A config with no replicas and default settings.
    pub fn new(primary: Arc<dyn Endpoint>) -> Self {
        Self {
            primary,
            replicas: Vec::new(),
            settings: ClusterSettings::default(),
        }
    }

    pub fn with_replica(mut self, replica: Arc<dyn Endpoint>) -> Self {
        self.replicas.push(replica);
        self
    }

    pub fn with_settings(mut self, settings: ClusterSettings) -> Self {
        self.settings = settings;
        self
    }
}

impl fmt::Debug for ClusterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterConfig")
            .field("replicas", &self.replicas.len())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
