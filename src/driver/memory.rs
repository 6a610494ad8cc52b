//! In-memory endpoint.
//!
//! # Responsibilities
//! - Stand in for a real database in tests and local runs
//! - Record every statement and count reads, writes, probes and closes
//! - Let callers flip liveness and slow down probes on demand
//!
//! Probes are recognised by the probe statement text and are never recorded
//! as reads or writes.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::driver::{DriverError, DriverResult, Endpoint, EndpointTransaction, Row, Value};
use crate::health::probe::PROBE_STATEMENT;

#[derive(Debug, Default)]
struct State {
    healthy: AtomicBool,
    closed: AtomicBool,
    fail_commits: AtomicBool,
    probe_delay: Mutex<Duration>,
    rows: Mutex<Vec<Row>>,
    statements: Mutex<Vec<String>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    probes: AtomicUsize,
    closes: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
}

/// A cloneable handle to one in-memory endpoint. Clones share state.
#[derive(Debug, Clone)]
pub struct MemoryEndpoint {
    name: Arc<str>,
    state: Arc<State>,
}

impl MemoryEndpoint {
    /// Create a healthy endpoint.
    pub fn new(name: impl Into<String>) -> Self {
        let state = State {
            healthy: AtomicBool::new(true),
            ..Default::default()
        };
        Self {
            name: Arc::from(name.into()),
            state: Arc::new(state),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Make every subsequent call (probes included) succeed or fail.
    pub fn set_healthy(&self, healthy: bool) {
        self.state.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn is_healthy(&self) -> bool {
        self.state.healthy.load(Ordering::SeqCst)
    }

    /// Delay applied to each probe before it answers.
    pub fn set_probe_delay(&self, delay: Duration) {
        *self.state.probe_delay.lock() = delay;
    }

    /// Make `commit` report a failure (the transaction still ends).
    pub fn set_fail_commits(&self, fail: bool) {
        self.state.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Rows returned by every `query` call.
    pub fn set_rows(&self, rows: Vec<Row>) {
        *self.state.rows.lock() = rows;
    }

    /// Statements seen so far, probes excluded.
    pub fn statements(&self) -> Vec<String> {
        self.state.statements.lock().clone()
    }

    pub fn reads(&self) -> usize {
        self.state.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.state.writes.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> usize {
        self.state.probes.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.state.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.state.rollbacks.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> DriverResult<()> {
        if self.state.closed.load(Ordering::SeqCst) {
            return Err(DriverError::Connection(format!("{} is closed", self.name)));
        }
        if !self.is_healthy() {
            return Err(DriverError::Connection(format!("{} is unreachable", self.name)));
        }
        Ok(())
    }

    fn record(&self, sql: &str) {
        self.state.statements.lock().push(sql.to_string());
    }
}

#[async_trait]
impl Endpoint for MemoryEndpoint {
    async fn execute(&self, sql: &str, _params: &[Value]) -> DriverResult<u64> {
        if sql == PROBE_STATEMENT {
            self.state.probes.fetch_add(1, Ordering::SeqCst);
            let delay = *self.state.probe_delay.lock();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.check_available()?;
            return Ok(0);
        }

        self.check_available()?;
        self.record(sql);
        self.state.writes.fetch_add(1, Ordering::SeqCst);
        Ok(1)
    }

    async fn query(&self, sql: &str, _params: &[Value]) -> DriverResult<Vec<Row>> {
        self.check_available()?;
        self.record(sql);
        self.state.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.rows.lock().clone())
    }

    async fn begin(&self) -> DriverResult<Box<dyn EndpointTransaction>> {
        self.check_available()?;
        self.record("BEGIN");
        Ok(Box::new(MemoryTransaction {
            endpoint: self.clone(),
        }))
    }

    async fn close(&self) -> DriverResult<()> {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        self.state.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Transaction on a [`MemoryEndpoint`]; statements are recorded on the parent.
#[derive(Debug)]
pub struct MemoryTransaction {
    endpoint: MemoryEndpoint,
}

#[async_trait]
impl EndpointTransaction for MemoryTransaction {
    async fn execute(&mut self, sql: &str, params: &[Value]) -> DriverResult<u64> {
        self.endpoint.execute(sql, params).await
    }

    async fn query(&mut self, sql: &str, params: &[Value]) -> DriverResult<Vec<Row>> {
        self.endpoint.query(sql, params).await
    }

    async fn commit(&mut self) -> DriverResult<()> {
        self.endpoint.record("COMMIT");
        if self.endpoint.state.fail_commits.load(Ordering::SeqCst) {
            return Err(DriverError::Transaction("commit rejected".to_string()));
        }
        self.endpoint.check_available()?;
        self.endpoint.state.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&mut self) -> DriverResult<()> {
        self.endpoint.record("ROLLBACK");
        self.endpoint.check_available()?;
        self.endpoint.state.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
