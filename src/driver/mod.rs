//! Endpoint driver abstraction.
//!
//! # Responsibilities
//! - Define the capability set the cluster needs from one SQL endpoint
//! - Define the values and rows that cross the endpoint boundary
//! - Provide concrete drivers (in-memory fake, Postgres)
//!
//! # Data Flow
//! ```text
//! Cluster façade
//!     → routing picks a MonitoredConnection
//!     → Arc<dyn Endpoint> (execute / query / begin / close)
//!     → driver talks to the database
//! ```
//!
//! # Design Decisions
//! - The cluster core never names a concrete driver
//! - Driver errors are passed through to callers untouched
//! - `close()` may be called once per configured slot; drivers shared between
//!   slots must tolerate repeated closes

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

/// Errors reported by an endpoint driver.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The endpoint could not be reached or the session is gone.
    #[error("connection error: {0}")]
    Connection(String),

    /// The statement was rejected or failed.
    #[error("query error: {0}")]
    Query(String),

    /// Transaction control (begin/commit/rollback) failed.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// A column lookup or conversion on a returned row failed.
    #[error("column `{column}`: {reason}")]
    Column { column: String, reason: String },

    /// Any other driver-specific failure.
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

/// Result type for driver calls.
pub type DriverResult<T> = Result<T, DriverError>;

/// A single SQL value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Conversion out of a [`Value`].
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Text(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bytes(b) => Some(b.clone()),
            _ => None,
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// One result row: ordered `(column, value)` pairs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column append.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.columns.push((column.into(), value.into()));
        self
    }

    pub fn push(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.columns.push((column.into(), value.into()));
    }

    /// Raw value of a column, if present.
    pub fn value(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Typed lookup by column name.
    pub fn get<T: FromValue>(&self, column: &str) -> DriverResult<T> {
        let value = self.value(column).ok_or_else(|| DriverError::Column {
            column: column.to_string(),
            reason: "not found".to_string(),
        })?;
        T::from_value(value).ok_or_else(|| DriverError::Column {
            column: column.to_string(),
            reason: format!("cannot convert {:?}", value),
        })
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Capability set required from one logical SQL endpoint.
#[async_trait]
pub trait Endpoint: Send + Sync + 'static {
    /// Execute a statement that returns no rows; yields the affected row count.
    async fn execute(&self, sql: &str, params: &[Value]) -> DriverResult<u64>;

    /// Execute a statement that returns rows.
    async fn query(&self, sql: &str, params: &[Value]) -> DriverResult<Vec<Row>>;

    /// Open a transaction pinned to this endpoint.
    async fn begin(&self) -> DriverResult<Box<dyn EndpointTransaction>>;

    /// Release the underlying connection.
    async fn close(&self) -> DriverResult<()>;
}

/// A driver-level transaction. Finished-state bookkeeping lives in
/// [`crate::cluster::Transaction`], so drivers only forward calls.
#[async_trait]
pub trait EndpointTransaction: Send {
    async fn execute(&mut self, sql: &str, params: &[Value]) -> DriverResult<u64>;

    async fn query(&mut self, sql: &str, params: &[Value]) -> DriverResult<Vec<Row>>;

    async fn commit(&mut self) -> DriverResult<()>;

    async fn rollback(&mut self) -> DriverResult<()>;
}
