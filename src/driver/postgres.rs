//! Postgres endpoint.
//!
//! # Responsibilities
//! - Adapt a pool of `tokio-postgres` sessions to [`Endpoint`]
//! - Convert [`Value`] parameters and result rows at the boundary
//! - Pin each transaction to one checked-out session
//!
//! # Design Decisions
//! - The pool is built lazily: an unreachable server does not fail
//!   construction, it fails probes
//! - `close()` drops the pool handle; idle sessions close once in-flight
//!   checkouts return
//! - A transaction dropped while open is rolled back on a spawned task before
//!   its session goes back to the pool

use std::error::Error as StdError;
use std::sync::Arc;

use async_trait::async_trait;
use bb8_postgres::bb8::{Pool, PooledConnection, RunError};
use bb8_postgres::PostgresConnectionManager;
use bytes::BytesMut;
use parking_lot::Mutex;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};
use tokio_postgres::NoTls;

use crate::driver::{DriverError, DriverResult, Endpoint, EndpointTransaction, Row, Value};

type Manager = PostgresConnectionManager<NoTls>;
type Session = PooledConnection<'static, Manager>;

/// One Postgres server reached through a session pool.
#[derive(Debug)]
pub struct PostgresEndpoint {
    label: String,
    pool: Mutex<Option<Pool<Manager>>>,
}

impl PostgresEndpoint {
    /// Build an endpoint for `dsn` with at most `max_sessions` pooled sessions.
    pub fn connect(dsn: &str, max_sessions: u32) -> DriverResult<Self> {
        let manager = Manager::new_from_stringlike(dsn, NoTls).map_err(pg_error)?;
        let pool = Pool::builder().max_size(max_sessions).build_unchecked(manager);
        let label = redact(dsn);

        tracing::debug!(endpoint = %label, max_sessions, "Postgres endpoint configured");
        Ok(Self {
            label,
            pool: Mutex::new(Some(pool)),
        })
    }

    /// `host:port/database`, without credentials.
    pub fn label(&self) -> &str {
        &self.label
    }

    fn pool(&self) -> DriverResult<Pool<Manager>> {
        self.pool
            .lock()
            .clone()
            .ok_or_else(|| DriverError::Connection(format!("{} is closed", self.label)))
    }

    async fn session(&self) -> DriverResult<Session> {
        self.pool()?.get_owned().await.map_err(run_error)
    }
}

#[async_trait]
impl Endpoint for PostgresEndpoint {
    async fn execute(&self, sql: &str, params: &[Value]) -> DriverResult<u64> {
        let session = self.session().await?;
        let params = Params::new(params);
        session.execute(sql, &params.refs()).await.map_err(pg_error)
    }

    async fn query(&self, sql: &str, params: &[Value]) -> DriverResult<Vec<Row>> {
        let session = self.session().await?;
        let params = Params::new(params);
        let rows = session.query(sql, &params.refs()).await.map_err(pg_error)?;
        rows.iter().map(convert_row).collect()
    }

    async fn begin(&self) -> DriverResult<Box<dyn EndpointTransaction>> {
        let session = self.session().await?;
        session
            .batch_execute("BEGIN")
            .await
            .map_err(|e| DriverError::Transaction(e.to_string()))?;
        Ok(Box::new(PostgresTransaction {
            session: Some(session),
        }))
    }

    async fn close(&self) -> DriverResult<()> {
        if self.pool.lock().take().is_some() {
            tracing::debug!(endpoint = %self.label, "Postgres pool released");
        }
        Ok(())
    }
}

/// A transaction holding one pooled session until it ends.
pub struct PostgresTransaction {
    session: Option<Session>,
}

impl PostgresTransaction {
    fn session(&self) -> DriverResult<&Session> {
        self.session
            .as_ref()
            .ok_or_else(|| DriverError::Transaction("transaction already ended".to_string()))
    }

    async fn finish(&mut self, statement: &str) -> DriverResult<()> {
        let session = self
            .session
            .take()
            .ok_or_else(|| DriverError::Transaction("transaction already ended".to_string()))?;
        session
            .batch_execute(statement)
            .await
            .map_err(|e| DriverError::Transaction(e.to_string()))
    }
}

#[async_trait]
impl EndpointTransaction for PostgresTransaction {
    async fn execute(&mut self, sql: &str, params: &[Value]) -> DriverResult<u64> {
        let params = Params::new(params);
        self.session()?
            .execute(sql, &params.refs())
            .await
            .map_err(pg_error)
    }

    async fn query(&mut self, sql: &str, params: &[Value]) -> DriverResult<Vec<Row>> {
        let params = Params::new(params);
        let rows = self
            .session()?
            .query(sql, &params.refs())
            .await
            .map_err(pg_error)?;
        rows.iter().map(convert_row).collect()
    }

    async fn commit(&mut self) -> DriverResult<()> {
        self.finish("COMMIT").await
    }

    async fn rollback(&mut self) -> DriverResult<()> {
        self.finish("ROLLBACK").await
    }
}

impl Drop for PostgresTransaction {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = session.batch_execute("ROLLBACK").await {
                        tracing::warn!(error = %e, "Rollback of abandoned transaction failed");
                    }
                });
            }
            Err(_) => tracing::warn!("Open transaction dropped outside a runtime; session discarded"),
        }
    }
}

/// Borrowed parameter list in the shape `tokio-postgres` expects.
struct Params<'a>(Vec<Param<'a>>);

impl<'a> Params<'a> {
    fn new(values: &'a [Value]) -> Self {
        Self(values.iter().map(Param).collect())
    }

    fn refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.0.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
    }
}

/// One [`Value`] bound as a statement parameter. `Null` binds to any type.
#[derive(Debug)]
struct Param<'a>(&'a Value);

impl ToSql for Param<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        match self.0 {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => b.to_sql(ty, out),
            Value::Int(i) if *ty == Type::INT2 => i16::try_from(*i)?.to_sql(ty, out),
            Value::Int(i) if *ty == Type::INT4 => i32::try_from(*i)?.to_sql(ty, out),
            Value::Int(i) => i.to_sql(ty, out),
            Value::Float(f) if *ty == Type::FLOAT4 => (*f as f32).to_sql(ty, out),
            Value::Float(f) => f.to_sql(ty, out),
            Value::Text(s) => s.to_sql(ty, out),
            Value::Bytes(b) => b.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn convert_row(row: &tokio_postgres::Row) -> DriverResult<Row> {
    let mut out = Row::new();
    for (i, column) in row.columns().iter().enumerate() {
        let ty = column.type_();
        let value = if *ty == Type::BOOL {
            row.try_get::<_, Option<bool>>(i).map(Value::from)
        } else if *ty == Type::INT2 {
            row.try_get::<_, Option<i16>>(i).map(|v| Value::from(v.map(i64::from)))
        } else if *ty == Type::INT4 {
            row.try_get::<_, Option<i32>>(i).map(Value::from)
        } else if *ty == Type::INT8 {
            row.try_get::<_, Option<i64>>(i).map(Value::from)
        } else if *ty == Type::FLOAT4 {
            row.try_get::<_, Option<f32>>(i).map(|v| Value::from(v.map(f64::from)))
        } else if *ty == Type::FLOAT8 {
            row.try_get::<_, Option<f64>>(i).map(Value::from)
        } else if *ty == Type::BYTEA {
            row.try_get::<_, Option<Vec<u8>>>(i).map(Value::from)
        } else {
            row.try_get::<_, Option<String>>(i).map(Value::from)
        };

        let value = value.map_err(|e| DriverError::Column {
            column: column.name().to_string(),
            reason: e.to_string(),
        })?;
        out.push(column.name(), value);
    }
    Ok(out)
}

fn pg_error(e: tokio_postgres::Error) -> DriverError {
    if e.is_closed() {
        DriverError::Connection(e.to_string())
    } else {
        DriverError::Other(Box::new(e))
    }
}

fn run_error(e: RunError<tokio_postgres::Error>) -> DriverError {
    match e {
        RunError::User(e) => pg_error(e),
        RunError::TimedOut => DriverError::Connection("timed out waiting for a pooled session".to_string()),
    }
}

/// Strip credentials from a URL-style DSN for logging.
fn redact(dsn: &str) -> String {
    match url::Url::parse(dsn) {
        Ok(url) => {
            let host = url.host_str().unwrap_or("localhost");
            let port = url.port().unwrap_or(5432);
            format!("{}:{}{}", host, port, url.path())
        }
        Err(_) => "postgres".to_string(),
    }
}

/// Open endpoints for a primary DSN and replica DSNs.
pub fn connect_all(
    primary: &str,
    replicas: &[String],
    max_sessions: u32,
) -> DriverResult<(Arc<dyn Endpoint>, Vec<Arc<dyn Endpoint>>)> {
    let primary: Arc<dyn Endpoint> = Arc::new(PostgresEndpoint::connect(primary, max_sessions)?);
    let replicas = replicas
        .iter()
        .map(|dsn| {
            PostgresEndpoint::connect(dsn, max_sessions).map(|e| Arc::new(e) as Arc<dyn Endpoint>)
        })
        .collect::<DriverResult<Vec<_>>>()?;
    Ok((primary, replicas))
}
