//! Liveness probe for one endpoint.
//!
//! # Responsibilities
//! - Run the probe statement against an endpoint
//! - Bound the wait by the probe timeout
//! - Refuse to start a second probe while one is still running
//!
//! # Design Decisions
//! - The check runs on its own spawned task and races a timer; whichever
//!   finishes first decides the outcome
//! - A check that loses the race is abandoned, not cancelled: the driver call
//!   may not be cancellable. Its task keeps running until the driver returns
//! - The in-flight flag is released by the check task itself, so an endpoint
//!   that never answers holds at most one abandoned task and every later
//!   probe is skipped until it returns

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time;

use crate::driver::{DriverError, Endpoint};

/// Statement used for liveness checks.
pub const PROBE_STATEMENT: &str = "select 1;";

/// Why a probe failed. Never surfaced to application callers.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("probe failed: {0}")]
    Endpoint(#[from] DriverError),

    #[error("probe task aborted: {0}")]
    Aborted(String),
}

/// Result of one probe request.
#[derive(Debug)]
pub enum ProbeOutcome {
    Healthy,
    Unhealthy(ProbeError),
    /// Another probe was already in flight; nothing was run.
    Skipped,
}

impl ProbeOutcome {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ProbeOutcome::Healthy)
    }
}

/// Clears the in-flight flag when dropped.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Timeout-bounded, non-overlapping liveness probe.
#[derive(Debug)]
pub struct Probe {
    timeout: Duration,
    in_flight: Arc<AtomicBool>,
}

impl Probe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// True while a check task (possibly an abandoned one) is running.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Probe `endpoint`, waiting at most the configured timeout.
    pub async fn run(&self, endpoint: &Arc<dyn Endpoint>) -> ProbeOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return ProbeOutcome::Skipped;
        }
        let guard = InFlight(self.in_flight.clone());

        let endpoint = endpoint.clone();
        let check = tokio::spawn(async move {
            let _guard = guard;
            endpoint.execute(PROBE_STATEMENT, &[]).await
        });

        // Dropping a JoinHandle detaches the task.
        match time::timeout(self.timeout, check).await {
            Ok(Ok(Ok(_))) => ProbeOutcome::Healthy,
            Ok(Ok(Err(e))) => ProbeOutcome::Unhealthy(ProbeError::Endpoint(e)),
            Ok(Err(e)) => ProbeOutcome::Unhealthy(ProbeError::Aborted(e.to_string())),
            Err(_) => ProbeOutcome::Unhealthy(ProbeError::Timeout(self.timeout)),
        }
    }
}
