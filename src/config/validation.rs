//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts and intervals > 0)
//! - Check that a file config names a primary when it names replicas
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: config → Result<(), Vec<ValidationError>>
//! - Runs before any connection is opened

use std::fmt;

use crate::config::schema::{ClusterSettings, FileConfig};

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field (e.g., "cluster.probe_timeout_ms").
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate cluster tunables.
pub fn validate_settings(settings: &ClusterSettings) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    check_settings(settings, &mut errors);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate a whole configuration file.
pub fn validate_config(config: &FileConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    check_settings(&config.cluster, &mut errors);

    let endpoints = &config.endpoints;
    if endpoints.primary.trim().is_empty() {
        errors.push(ValidationError::new("endpoints.primary", "must not be empty"));
    }
    for (i, replica) in endpoints.replicas.iter().enumerate() {
        if replica.trim().is_empty() {
            errors.push(ValidationError::new(
                format!("endpoints.replicas[{}]", i),
                "must not be empty",
            ));
        }
    }
    if endpoints.max_sessions == 0 {
        errors.push(ValidationError::new("endpoints.max_sessions", "must be at least 1"));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<std::net::SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("`{}` is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_settings(settings: &ClusterSettings, errors: &mut Vec<ValidationError>) {
    if settings.probe_timeout_ms == 0 {
        errors.push(ValidationError::new("cluster.probe_timeout_ms", "must be greater than 0"));
    }
    if settings.health_check_interval_ms == 0 {
        errors.push(ValidationError::new(
            "cluster.health_check_interval_ms",
            "must be greater than 0",
        ));
    }
    match settings.replica_refresh_ms {
        Some(0) => errors.push(ValidationError::new(
            "cluster.replica_refresh_ms",
            "must be greater than 0",
        )),
        // Half of a 1ms interval rounds to zero.
        None if settings.health_check_interval_ms == 1 => errors.push(ValidationError::new(
            "cluster.replica_refresh_ms",
            "required when health_check_interval_ms is below 2",
        )),
        _ => {}
    }
}
