//! Cluster façade.
//!
//! # Responsibilities
//! - Build every monitored connection and the routing manager from config
//! - Route reads to replicas and writes/transactions to the primary
//! - Report aggregate health
//! - Own the shutdown sequence
//!
//! # Design Decisions
//! - The only type application code needs; construct once and share it
//!   (it is cheap to clone)
//! - No retries: routing failures and driver errors go straight to the caller
//! - Reads carry no read-after-write guarantee relative to the primary
//! - Dropping the last handle stops background loops but does not close
//!   endpoints; call [`Cluster::shutdown`] for that

use std::future::Future;
use std::panic::Location;
use std::sync::Arc;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};

use crate::config::validation::validate_settings;
use crate::config::ClusterConfig;
use crate::driver::{Row, Value};
use crate::error::{Error, Result};
use crate::health::MonitoredConnection;
use crate::observability::metrics::{self, RoutingFailure};
use crate::routing::ClusterManager;

mod annotate;
mod transaction;

use annotate::annotate;
pub use transaction::Transaction;

/// Point-in-time liveness summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterHealth {
    /// The primary's last probe succeeded.
    pub primary_ok: bool,
    /// At least one replica in the active set is connected.
    pub any_replica_ok: bool,
}

/// Primary/replica cluster handle.
#[derive(Clone)]
pub struct Cluster {
    manager: Arc<ClusterManager>,
    annotate: bool,
}

impl Cluster {
    /// Validate settings, probe every endpoint once and start the background
    /// loops. Unreachable endpoints do not fail construction; they start out
    /// marked down.
    pub async fn new(config: ClusterConfig) -> Result<Self> {
        validate_settings(&config.settings).map_err(Error::InvalidSettings)?;

        let settings = config.settings;
        let probe_timeout = settings.probe_timeout();
        let interval = settings.health_check_interval();

        let primary = MonitoredConnection::start("primary", config.primary, probe_timeout, interval);
        let replicas = join_all(config.replicas.into_iter().enumerate().map(|(i, endpoint)| {
            MonitoredConnection::start(format!("replica-{}", i), endpoint, probe_timeout, interval)
        }));
        let (primary, replicas) = tokio::join!(primary, replicas);

        let manager = ClusterManager::start(primary, replicas, settings.replica_refresh_interval());

        let cluster = Self {
            manager,
            annotate: settings.annotate_queries,
        };
        let health = cluster.health();
        tracing::info!(
            replicas = cluster.manager.replicas().len(),
            primary_ok = health.primary_ok,
            any_replica_ok = health.any_replica_ok,
            probe_timeout_ms = settings.probe_timeout_ms,
            health_check_interval_ms = settings.health_check_interval_ms,
            "Cluster started"
        );
        Ok(cluster)
    }

    /// Run a read on an active replica, or on the primary when no replica is
    /// active.
    #[track_caller]
    pub fn read<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [Value],
    ) -> impl Future<Output = Result<Vec<Row>>> + Send + 'a {
        let sql = annotate(sql, Location::caller(), self.annotate);
        async move {
            let conn = self.manager.pick_replica().ok_or_else(|| {
                tracing::debug!("No reader available");
                metrics::record_routing_failure(RoutingFailure::Reader);
                Error::NoReaderAvailable
            })?;
            Ok(conn.endpoint().query(&sql, params).await?)
        }
    }

    /// Execute a statement on the primary; yields the affected row count.
    #[track_caller]
    pub fn write_exec<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [Value],
    ) -> impl Future<Output = Result<u64>> + Send + 'a {
        let sql = annotate(sql, Location::caller(), self.annotate);
        async move {
            let conn = self.writer()?;
            Ok(conn.endpoint().execute(&sql, params).await?)
        }
    }

    /// Run a row-returning statement on the primary (e.g. `insert … returning`).
    #[track_caller]
    pub fn write_query<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [Value],
    ) -> impl Future<Output = Result<Vec<Row>>> + Send + 'a {
        let sql = annotate(sql, Location::caller(), self.annotate);
        async move {
            let conn = self.writer()?;
            Ok(conn.endpoint().query(&sql, params).await?)
        }
    }

    /// Open a transaction on the primary.
    pub async fn begin_transaction(&self) -> Result<Transaction> {
        let conn = self.writer()?;
        let inner = conn.endpoint().begin().await?;
        Ok(Transaction::new(conn.name(), inner, self.annotate))
    }

    fn writer(&self) -> Result<Arc<MonitoredConnection>> {
        self.manager.pick_primary().ok_or_else(|| {
            tracing::debug!("No writer available");
            metrics::record_routing_failure(RoutingFailure::Writer);
            Error::NoWriterAvailable
        })
    }

    /// Primary liveness plus whether any replica in the active set is up.
    pub fn health(&self) -> ClusterHealth {
        let any_replica_ok = self
            .manager
            .active_replicas()
            .iter()
            .any(|replica| replica.is_connected());

        ClusterHealth {
            primary_ok: self.manager.primary().is_connected(),
            any_replica_ok,
        }
    }

    /// The routing manager, for diagnostics.
    pub fn manager(&self) -> &ClusterManager {
        &self.manager
    }

    /// Stop every loop and close every endpoint. Later calls do nothing.
    pub async fn shutdown(&self) {
        self.manager.shutdown().await;
    }
}

impl std::fmt::Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cluster")
            .field("manager", &self.manager)
            .field("annotate", &self.annotate)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClusterSettings;
    use crate::driver::memory::MemoryEndpoint;

    fn settings(annotate: bool) -> ClusterSettings {
        ClusterSettings {
            probe_timeout_ms: 50,
            health_check_interval_ms: 60_000,
            replica_refresh_ms: None,
            annotate_queries: annotate,
        }
    }

    #[tokio::test]
    async fn test_rejects_invalid_settings() {
        let primary = MemoryEndpoint::new("primary");
        let config = ClusterConfig::new(Arc::new(primary)).with_settings(ClusterSettings {
            probe_timeout_ms: 0,
            ..Default::default()
        });

        let err = Cluster::new(config).await.unwrap_err();
        assert!(matches!(err, Error::InvalidSettings(ref errors) if errors.len() == 1));
    }

    #[tokio::test]
    async fn test_read_returns_rows() {
        let primary = MemoryEndpoint::new("primary");
        let replica = MemoryEndpoint::new("replica");
        replica.set_rows(vec![Row::new().with("id", 1i64)]);

        let cluster = Cluster::new(
            ClusterConfig::new(Arc::new(primary.clone()))
                .with_replica(Arc::new(replica.clone()))
                .with_settings(settings(false)),
        )
        .await
        .unwrap();

        let rows = cluster.read("select id from t", &[]).await.unwrap();
        assert_eq!(rows[0].get::<i64>("id").unwrap(), 1);
        assert_eq!(replica.statements(), vec!["select id from t"]);
        assert_eq!(primary.reads(), 0);
    }

    #[tokio::test]
    async fn test_statements_are_annotated() {
        let primary = MemoryEndpoint::new("primary");
        let cluster = Cluster::new(
            ClusterConfig::new(Arc::new(primary.clone())).with_settings(settings(true)),
        )
        .await
        .unwrap();

        let line = line!() + 1;
        cluster.write_exec("update t set x = 1", &[]).await.unwrap();

        let statements = primary.statements();
        let expected = format!("/* {}:{}:", file!(), line);
        assert!(statements[0].starts_with(&expected), "got {}", statements[0]);
        assert!(statements[0].ends_with("\nupdate t set x = 1"));
    }

    #[tokio::test]
    async fn test_driver_error_passes_through() {
        let primary = MemoryEndpoint::new("primary");
        let cluster = Cluster::new(
            ClusterConfig::new(Arc::new(primary.clone())).with_settings(settings(false)),
        )
        .await
        .unwrap();

        // Flag stays up until the next probe, so the call reaches the driver.
        primary.set_healthy(false);
        let err = cluster.write_exec("delete from t", &[]).await.unwrap_err();
        assert!(matches!(err, Error::Driver(crate::driver::DriverError::Connection(_))));
    }

    #[tokio::test]
    async fn test_probe_timeout_longer_than_interval() {
        let primary = MemoryEndpoint::new("primary");
        let cluster = Cluster::new(ClusterConfig::new(Arc::new(primary.clone())).with_settings(
            ClusterSettings {
                probe_timeout_ms: 2_000,
                health_check_interval_ms: 1_000,
                replica_refresh_ms: None,
                annotate_queries: false,
            },
        ))
        .await
        .unwrap();

        assert!(cluster.health().primary_ok);
        cluster.write_exec("update t set x = 1", &[]).await.unwrap();
        cluster.shutdown().await;
    }

    #[tokio::test]
    async fn test_health_reads_active_snapshot() {
        let primary = MemoryEndpoint::new("primary");
        let replica = MemoryEndpoint::new("replica");
        replica.set_healthy(false);

        let cluster = Cluster::new(
            ClusterConfig::new(Arc::new(primary.clone()))
                .with_replica(Arc::new(replica.clone()))
                .with_settings(ClusterSettings {
                    replica_refresh_ms: Some(60_000),
                    ..settings(false)
                }),
        )
        .await
        .unwrap();
        assert!(!cluster.health().any_replica_ok);

        replica.set_healthy(true);
        let conn = &cluster.manager().replicas()[0];
        conn.update_status().await;
        assert!(conn.is_connected());

        // Up, but not in the active set until the next recomputation.
        assert!(!cluster.health().any_replica_ok);

        cluster.manager().recompute_active_replicas();
        assert!(cluster.health().any_replica_ok);

        cluster.shutdown().await;
    }

    #[tokio::test]
    async fn test_health_serializes() {
        let health = ClusterHealth {
            primary_ok: true,
            any_replica_ok: false,
        };
        assert_eq!(
            serde_json::to_string(&health).unwrap(),
            r#"{"primary_ok":true,"any_replica_ok":false}"#
        );
    }
}
