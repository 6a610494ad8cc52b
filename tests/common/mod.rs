//! Shared utilities for integration and load testing.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sql_cluster::driver::memory::MemoryEndpoint;
use sql_cluster::{Cluster, ClusterConfig, ClusterSettings};

/// Probe every 50ms, recompute every 25ms.
pub fn fast_settings() -> ClusterSettings {
    ClusterSettings {
        probe_timeout_ms: 20,
        health_check_interval_ms: 50,
        replica_refresh_ms: Some(25),
        annotate_queries: false,
    }
}

/// A started cluster plus handles to its in-memory endpoints.
pub struct TestCluster {
    pub cluster: Cluster,
    pub primary: MemoryEndpoint,
    pub replicas: Vec<MemoryEndpoint>,
}

/// Start a cluster of healthy in-memory endpoints.
pub async fn start_cluster(replicas: usize, settings: ClusterSettings) -> TestCluster {
    let primary = MemoryEndpoint::new("primary");
    let replicas: Vec<_> = (0..replicas)
        .map(|i| MemoryEndpoint::new(format!("replica-{}", i)))
        .collect();

    let mut config = ClusterConfig::new(Arc::new(primary.clone())).with_settings(settings);
    for replica in &replicas {
        config = config.with_replica(Arc::new(replica.clone()));
    }

    let cluster = Cluster::new(config).await.unwrap();
    TestCluster {
        cluster,
        primary,
        replicas,
    }
}

/// Poll `condition` until it holds or `timeout` passes.
#[allow(dead_code)]
pub async fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
