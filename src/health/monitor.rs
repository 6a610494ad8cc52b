//! Continuously probed connection.
//!
//! # Responsibilities
//! - Own one endpoint exclusively
//! - Keep an atomically readable `connected` flag fresh via a probe loop
//! - Close the endpoint exactly once on quit
//!
//! # Design Decisions
//! - First probe runs before the loop starts, so the flag is meaningful as
//!   soon as the connection is returned
//! - The loop holds a weak reference; dropping the last handle ends it
//! - Only transitions are logged, steady-state probes are silent

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::driver::Endpoint;
use crate::health::probe::{Probe, ProbeError, ProbeOutcome};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;

/// One endpoint plus its liveness state and probe loop.
pub struct MonitoredConnection {
    name: String,
    endpoint: Arc<dyn Endpoint>,
    probe: Probe,
    check_interval: Duration,
    connected: AtomicBool,
    closed: AtomicBool,
    shutdown: Shutdown,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MonitoredConnection {
    /// Probe `endpoint` once, then start probing it every `check_interval`.
    pub async fn start(
        name: impl Into<String>,
        endpoint: Arc<dyn Endpoint>,
        probe_timeout: Duration,
        check_interval: Duration,
    ) -> Arc<Self> {
        let conn = Arc::new(Self {
            name: name.into(),
            endpoint,
            probe: Probe::new(probe_timeout),
            check_interval,
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            shutdown: Shutdown::new(),
            task: Mutex::new(None),
        });

        conn.update_status().await;
        tracing::debug!(
            endpoint = %conn.name,
            connected = conn.is_connected(),
            "Initial probe complete"
        );

        let handle = tokio::spawn(Self::run(
            Arc::downgrade(&conn),
            check_interval,
            conn.shutdown.subscribe(),
        ));
        *conn.task.lock() = Some(handle);
        conn
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The underlying endpoint, for executing statements.
    pub fn endpoint(&self) -> &Arc<dyn Endpoint> {
        &self.endpoint
    }

    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    /// Lock-free read of the last probe result.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Probe once and store the result. Skipped probes leave the flag alone.
    pub(crate) async fn update_status(&self) {
        if self.is_closed() {
            return;
        }

        let connected = match self.probe.run(&self.endpoint).await {
            ProbeOutcome::Skipped => {
                tracing::trace!(endpoint = %self.name, "Probe already in flight, skipping");
                return;
            }
            ProbeOutcome::Healthy => true,
            ProbeOutcome::Unhealthy(e) => {
                if matches!(e, ProbeError::Timeout(_)) {
                    metrics::record_probe_timeout(&self.name);
                }
                if self.is_connected() {
                    tracing::warn!(endpoint = %self.name, error = %e, "Connection lost");
                } else {
                    tracing::debug!(endpoint = %self.name, error = %e, "Probe failed");
                }
                false
            }
        };

        // A quit that raced this probe wins: `quit` sets `closed` before it
        // clears the flag, so a store that lands after that clear sees it.
        if self.is_closed() {
            return;
        }
        let was = self.connected.swap(connected, Ordering::SeqCst);
        if self.closed.load(Ordering::SeqCst) {
            self.connected.store(false, Ordering::SeqCst);
            return;
        }
        if connected && !was {
            tracing::info!(endpoint = %self.name, "Connection established");
        }
        metrics::record_endpoint_up(&self.name, connected);
    }

    async fn run(this: Weak<Self>, period: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let Some(conn) = this.upgrade() else { break };
                    conn.update_status().await;
                }
                _ = shutdown.recv() => break,
            }
        }
    }

    /// Stop probing, close the endpoint and mark the connection down.
    /// Later calls do nothing.
    pub async fn quit(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.shutdown.trigger();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(endpoint = %self.name, error = %e, "Probe loop ended abnormally");
            }
        }

        if let Err(e) = self.endpoint.close().await {
            tracing::error!(endpoint = %self.name, error = %e, "Failed to close database connection");
        }

        self.connected.store(false, Ordering::SeqCst);
        metrics::record_endpoint_up(&self.name, false);
        tracing::debug!(endpoint = %self.name, "Connection closed");
    }
}

impl std::fmt::Debug for MonitoredConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitoredConnection")
            .field("name", &self.name)
            .field("connected", &self.is_connected())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::memory::MemoryEndpoint;

    const TIMEOUT: Duration = Duration::from_millis(100);
    const INTERVAL: Duration = Duration::from_millis(50);

    async fn start(mem: &MemoryEndpoint) -> Arc<MonitoredConnection> {
        MonitoredConnection::start(mem.name(), Arc::new(mem.clone()), TIMEOUT, INTERVAL).await
    }

    #[tokio::test]
    async fn test_initial_status_is_known() {
        let up = MemoryEndpoint::new("up");
        let down = MemoryEndpoint::new("down");
        down.set_healthy(false);

        assert!(start(&up).await.is_connected());
        assert!(!start(&down).await.is_connected());
    }

    #[tokio::test]
    async fn test_loop_tracks_liveness() {
        let mem = MemoryEndpoint::new("db");
        let conn = start(&mem).await;
        assert!(conn.is_connected());

        mem.set_healthy(false);
        time::sleep(INTERVAL * 4).await;
        assert!(!conn.is_connected());

        mem.set_healthy(true);
        time::sleep(INTERVAL * 4).await;
        assert!(conn.is_connected());
        assert!(mem.probes() >= 3);
    }

    #[tokio::test]
    async fn test_slow_probe_marks_down() {
        let mem = MemoryEndpoint::new("db");
        mem.set_probe_delay(Duration::from_millis(500));

        let conn = start(&mem).await;
        assert!(!conn.is_connected());
    }

    #[tokio::test]
    async fn test_quit_is_idempotent() {
        let mem = MemoryEndpoint::new("db");
        let conn = start(&mem).await;

        conn.quit().await;
        conn.quit().await;

        assert_eq!(mem.closes(), 1);
        assert!(conn.is_closed());
        assert!(!conn.is_connected());

        // No probes after quit.
        let probes = mem.probes();
        time::sleep(INTERVAL * 3).await;
        assert_eq!(mem.probes(), probes);

        conn.update_status().await;
        assert!(!conn.is_connected());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_status_updates_racing_quit_stay_down() {
        for _ in 0..50 {
            let mem = MemoryEndpoint::new("db");
            let conn = start(&mem).await;

            let updaters: Vec<_> = (0..4)
                .map(|_| {
                    let conn = conn.clone();
                    tokio::spawn(async move {
                        for _ in 0..5 {
                            conn.update_status().await;
                        }
                    })
                })
                .collect();
            conn.quit().await;
            for updater in updaters {
                updater.await.unwrap();
            }

            assert!(conn.is_closed());
            assert!(!conn.is_connected());
        }
    }

    #[tokio::test]
    async fn test_drop_stops_loop() {
        let mem = MemoryEndpoint::new("db");
        let conn = start(&mem).await;
        drop(conn);

        time::sleep(INTERVAL).await;
        let probes = mem.probes();
        time::sleep(INTERVAL * 3).await;
        assert_eq!(mem.probes(), probes);
        assert_eq!(mem.closes(), 0);
    }
}
