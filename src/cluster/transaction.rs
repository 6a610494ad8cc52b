//! Transactions pinned to the primary.

use std::future::Future;
use std::panic::Location;

use uuid::Uuid;

use crate::cluster::annotate::annotate;
use crate::driver::{EndpointTransaction, Row, Value};
use crate::error::{Error, Result};

/// A transaction on the primary endpoint.
///
/// Ends with exactly one `commit` or `rollback`; any call after that returns
/// [`Error::TransactionAlreadyFinished`]. A failed commit or rollback still
/// ends the transaction.
pub struct Transaction {
    id: Uuid,
    endpoint: String,
    inner: Option<Box<dyn EndpointTransaction>>,
    annotate: bool,
}

impl Transaction {
    pub(crate) fn new(endpoint: &str, inner: Box<dyn EndpointTransaction>, annotate: bool) -> Self {
        let id = Uuid::new_v4();
        tracing::debug!(tx = %id, endpoint = %endpoint, "Transaction started");
        Self {
            id,
            endpoint: endpoint.to_string(),
            inner: Some(inner),
            annotate,
        }
    }

    /// Identifier used in log records.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_none()
    }

    /// Execute a statement inside the transaction.
    #[track_caller]
    pub fn execute<'a>(
        &'a mut self,
        sql: &'a str,
        params: &'a [Value],
    ) -> impl Future<Output = Result<u64>> + Send + 'a {
        let sql = annotate(sql, Location::caller(), self.annotate);
        async move {
            let tx = self.inner.as_mut().ok_or(Error::TransactionAlreadyFinished)?;
            Ok(tx.execute(&sql, params).await?)
        }
    }

    /// Run a query inside the transaction.
    #[track_caller]
    pub fn query<'a>(
        &'a mut self,
        sql: &'a str,
        params: &'a [Value],
    ) -> impl Future<Output = Result<Vec<Row>>> + Send + 'a {
        let sql = annotate(sql, Location::caller(), self.annotate);
        async move {
            let tx = self.inner.as_mut().ok_or(Error::TransactionAlreadyFinished)?;
            Ok(tx.query(&sql, params).await?)
        }
    }

    pub async fn commit(&mut self) -> Result<()> {
        let mut tx = self.inner.take().ok_or(Error::TransactionAlreadyFinished)?;
        let result = tx.commit().await;
        match &result {
            Ok(()) => tracing::debug!(tx = %self.id, "Transaction committed"),
            Err(e) => tracing::warn!(tx = %self.id, endpoint = %self.endpoint, error = %e, "Commit failed"),
        }
        Ok(result?)
    }

    pub async fn rollback(&mut self) -> Result<()> {
        let mut tx = self.inner.take().ok_or(Error::TransactionAlreadyFinished)?;
        let result = tx.rollback().await;
        match &result {
            Ok(()) => tracing::debug!(tx = %self.id, "Transaction rolled back"),
            Err(e) => tracing::warn!(tx = %self.id, endpoint = %self.endpoint, error = %e, "Rollback failed"),
        }
        Ok(result?)
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.inner.is_some() {
            tracing::warn!(
                tx = %self.id,
                endpoint = %self.endpoint,
                "Transaction dropped without commit or rollback"
            );
        }
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .field("finished", &self.is_finished())
            .finish()
    }
}
