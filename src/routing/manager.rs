//! Primary/replica connection manager.
//!
//! # Responsibilities
//! - Own the primary and replica connections
//! - Periodically recompute which replicas are usable
//! - Answer "who reads" and "who writes"
//! - Run the ordered shutdown of every connection

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::future::join_all;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::health::MonitoredConnection;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;

type Snapshot = Arc<[Arc<MonitoredConnection>]>;

/// Routes reads to active replicas and writes to the primary.
pub struct ClusterManager {
    primary: Arc<MonitoredConnection>,
    replicas: Vec<Arc<MonitoredConnection>>,
    /// Replaced wholesale on every recomputation.
    active_replicas: RwLock<Snapshot>,
    refresh_interval: Duration,
    closed: AtomicBool,
    shutdown: Shutdown,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ClusterManager {
    /// Compute the active set once, then keep recomputing it every
    /// `refresh_interval`.
    pub fn start(
        primary: Arc<MonitoredConnection>,
        replicas: Vec<Arc<MonitoredConnection>>,
        refresh_interval: Duration,
    ) -> Arc<Self> {
        let manager = Arc::new(Self {
            primary,
            replicas,
            active_replicas: RwLock::new(Arc::from(Vec::new())),
            refresh_interval,
            closed: AtomicBool::new(false),
            shutdown: Shutdown::new(),
            task: Mutex::new(None),
        });

        manager.recompute_active_replicas();

        let handle = tokio::spawn(Self::run(
            Arc::downgrade(&manager),
            refresh_interval,
            manager.shutdown.subscribe(),
        ));
        *manager.task.lock() = Some(handle);
        manager
    }

    async fn run(this: Weak<Self>, period: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let Some(manager) = this.upgrade() else { break };
                    manager.recompute_active_replicas();
                }
                _ = shutdown.recv() => break,
            }
        }
    }

    /// Rebuild the active replica set from the current connection flags.
    ///
    /// With no configured replicas the set stays empty.
    pub fn recompute_active_replicas(&self) {
        if self.replicas.is_empty() {
            metrics::record_active_replicas(0);
            return;
        }

        let active: Vec<_> = self
            .replicas
            .iter()
            .filter(|replica| replica.is_connected())
            .cloned()
            .collect();
        let count = active.len();

        let previous = {
            let mut guard = self.active_replicas.write();
            std::mem::replace(&mut *guard, Arc::from(active))
        };

        if previous.len() != count {
            tracing::info!(
                active = count,
                configured = self.replicas.len(),
                "Active replica set changed"
            );
        }
        metrics::record_active_replicas(count);
    }

    /// Current active replica snapshot.
    pub fn active_replicas(&self) -> Snapshot {
        self.active_replicas.read().clone()
    }

    /// A uniformly random active replica, or the primary when none is active.
    /// `None` when the primary is down too.
    pub fn pick_replica(&self) -> Option<Arc<MonitoredConnection>> {
        let active = self.active_replicas();
        match active.len() {
            0 => self.pick_primary(),
            1 => Some(active[0].clone()),
            n => Some(active[rand::thread_rng().gen_range(0..n)].clone()),
        }
    }

    /// The primary if its last probe succeeded. Never a replica.
    pub fn pick_primary(&self) -> Option<Arc<MonitoredConnection>> {
        if self.primary.is_connected() {
            Some(self.primary.clone())
        } else {
            None
        }
    }

    pub fn primary(&self) -> &Arc<MonitoredConnection> {
        &self.primary
    }

    /// Every configured replica, in configuration order.
    pub fn replicas(&self) -> &[Arc<MonitoredConnection>] {
        &self.replicas
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop recomputing, quit every connection, then recompute once more so
    /// the active set reflects the closed connections. Later calls do nothing.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!(replicas = self.replicas.len(), "Cluster shutting down");

        self.shutdown.trigger();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Replica refresh loop ended abnormally");
            }
        }

        self.primary.quit().await;
        join_all(self.replicas.iter().map(|replica| replica.quit())).await;

        self.recompute_active_replicas();
        tracing::info!("Cluster shut down");
    }
}

impl std::fmt::Debug for ClusterManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterManager")
            .field("primary", &self.primary)
            .field("replicas", &self.replicas)
            .field("active_replicas", &self.active_replicas().len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::memory::MemoryEndpoint;
    use crate::observability::metrics::capture::GaugeCapture;
    use std::collections::HashSet;

    const TIMEOUT: Duration = Duration::from_millis(50);
    // Long enough that no background probe runs during a test.
    const SLOW: Duration = Duration::from_secs(60);

    async fn conn(mem: &MemoryEndpoint, interval: Duration) -> Arc<MonitoredConnection> {
        MonitoredConnection::start(mem.name(), Arc::new(mem.clone()), TIMEOUT, interval).await
    }

    #[tokio::test]
    async fn test_no_replicas_reads_hit_primary() {
        let primary = MemoryEndpoint::new("primary");
        let manager = ClusterManager::start(conn(&primary, SLOW).await, Vec::new(), SLOW);

        for _ in 0..20 {
            let reader = manager.pick_replica().unwrap();
            let writer = manager.pick_primary().unwrap();
            assert!(Arc::ptr_eq(&reader, &writer));
        }
        assert!(manager.active_replicas().is_empty());
    }

    #[tokio::test]
    async fn test_primary_only_reports_zero_active() {
        let primary = MemoryEndpoint::new("primary");
        let manager = ClusterManager::start(conn(&primary, SLOW).await, Vec::new(), SLOW);

        let capture = GaugeCapture::default();
        ::metrics::with_local_recorder(&capture, || manager.recompute_active_replicas());
        assert_eq!(capture.gauge("sql_cluster_active_replicas"), Some(0.0));
    }

    #[tokio::test]
    async fn test_single_active_replica_always_picked() {
        let primary = MemoryEndpoint::new("primary");
        let r0 = MemoryEndpoint::new("replica-0");
        let r1 = MemoryEndpoint::new("replica-1");
        r1.set_healthy(false);

        let manager = ClusterManager::start(
            conn(&primary, SLOW).await,
            vec![conn(&r0, SLOW).await, conn(&r1, SLOW).await],
            SLOW,
        );

        for _ in 0..100 {
            assert_eq!(manager.pick_replica().unwrap().name(), "replica-0");
        }
    }

    #[tokio::test]
    async fn test_random_choice_covers_all_active() {
        let primary = MemoryEndpoint::new("primary");
        let replicas: Vec<_> = (0..3).map(|i| MemoryEndpoint::new(format!("replica-{}", i))).collect();
        let mut conns = Vec::new();
        for r in &replicas {
            conns.push(conn(r, SLOW).await);
        }
        let manager = ClusterManager::start(conn(&primary, SLOW).await, conns, SLOW);

        let picked: HashSet<_> = (0..300)
            .map(|_| manager.pick_replica().unwrap().name().to_string())
            .collect();
        assert_eq!(picked.len(), 3);
        assert!(!picked.contains("primary"));
    }

    #[tokio::test]
    async fn test_exclusion_waits_for_recompute() {
        let primary = MemoryEndpoint::new("primary");
        let r0 = MemoryEndpoint::new("replica-0");
        let r1 = MemoryEndpoint::new("replica-1");
        let r0_conn = conn(&r0, SLOW).await;

        let manager = ClusterManager::start(
            conn(&primary, SLOW).await,
            vec![r0_conn.clone(), conn(&r1, SLOW).await],
            SLOW,
        );
        assert_eq!(manager.active_replicas().len(), 2);

        r0.set_healthy(false);
        r0_conn.update_status().await;
        assert!(!r0_conn.is_connected());

        // Still routable until the set is recomputed.
        assert_eq!(manager.active_replicas().len(), 2);

        manager.recompute_active_replicas();
        for _ in 0..50 {
            assert_eq!(manager.pick_replica().unwrap().name(), "replica-1");
        }
    }

    #[tokio::test]
    async fn test_background_recompute() {
        let primary = MemoryEndpoint::new("primary");
        let r0 = MemoryEndpoint::new("replica-0");
        let interval = Duration::from_millis(40);

        let manager = ClusterManager::start(
            conn(&primary, interval).await,
            vec![conn(&r0, interval).await],
            interval / 2,
        );
        assert_eq!(manager.active_replicas().len(), 1);

        r0.set_healthy(false);
        time::sleep(interval * 5).await;
        assert!(manager.active_replicas().is_empty());
        assert_eq!(manager.pick_replica().unwrap().name(), "primary");

        primary.set_healthy(false);
        time::sleep(interval * 5).await;
        assert!(manager.pick_replica().is_none());
        assert!(manager.pick_primary().is_none());
    }

    #[tokio::test]
    async fn test_shutdown_twice() {
        let primary = MemoryEndpoint::new("primary");
        let r0 = MemoryEndpoint::new("replica-0");
        let manager = ClusterManager::start(
            conn(&primary, SLOW).await,
            vec![conn(&r0, SLOW).await],
            SLOW,
        );

        manager.shutdown().await;
        manager.shutdown().await;

        assert!(manager.is_closed());
        assert_eq!(primary.closes(), 1);
        assert_eq!(r0.closes(), 1);
        assert!(manager.active_replicas().is_empty());
        assert!(manager.pick_primary().is_none());
        assert!(manager.pick_replica().is_none());
    }
}
