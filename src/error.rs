//! Errors surfaced to application callers.

use thiserror::Error;

use crate::config::ValidationError;
use crate::driver::DriverError;

/// Errors returned by [`crate::Cluster`] and [`crate::Transaction`].
#[derive(Debug, Error)]
pub enum Error {
    /// No active replica and the primary is down.
    #[error("no replica connection available")]
    NoReaderAvailable,

    /// The primary is down. Writes never fall back to replicas.
    #[error("no primary connection available")]
    NoWriterAvailable,

    /// Commit or rollback was already called on this transaction.
    #[error("transaction has already been committed or rolled back")]
    TransactionAlreadyFinished,

    /// Cluster settings failed validation.
    #[error("invalid cluster settings: {}", join(.0))]
    InvalidSettings(Vec<ValidationError>),

    /// Error from the endpoint driver, passed through unchanged.
    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl Error {
    /// True for routing failures that may clear once probes recover.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Error::NoReaderAvailable | Error::NoWriterAvailable)
    }
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type for cluster operations.
pub type Result<T> = std::result::Result<T, Error>;
