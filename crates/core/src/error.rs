//! Core error types for the Outpost domain

use thiserror::Error;

#[cfg(feature = "sqlite")]
use sqlx;

#[derive(Error, Debug)]
pub enum OutpostError {
    #[error("Transient network error: {service} - {error}")]
    TransientNetwork { service: String, error: String },

    #[error("Authentication failed: {service} - {message}")]
    AuthFailed { service: String, message: String },

    #[error("Rate limited by {service}, retry after {retry_after_secs:?}s")]
    RateLimited {
        service: String,
        retry_after_secs: Option<u64>,
    },

    #[error("Not configured: {what} - {message}")]
    NotConfigured { what: String, message: String },

    #[error("Protocol parse error: {service} - {message}")]
    ProtocolParse { service: String, message: String },

    #[error("Invalid transition: {entity} {from} -> {to}")]
    InvalidTransition {
        entity: String,
        from: String,
        to: String,
    },

    #[error("Release is blocklisted: {title}")]
    BlocklistedRelease { title: String },

    #[error("No suitable download client for protocol {protocol}")]
    NoSuitableClient { protocol: String },

    #[error("Import found no video file under {path}")]
    ImportNoVideo { path: String },

    #[error("Import destination already exists: {path}")]
    ImportPathCollision { path: String },

    #[error("Filesystem error: {path} - {error}")]
    FilesystemIO { path: String, error: String },

    #[error("Storage full: {library} has {free_bytes} bytes free")]
    StorageFull { library: String, free_bytes: u64 },

    #[error("Operation cancelled: {operation}")]
    Cancelled { operation: String },

    #[error("Database error: {message}")]
    DatabaseError { message: String },

    #[error("Domain validation error: {field} - {message}")]
    ValidationError { field: String, message: String },

    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    RetryExhausted {
        operation: String,
        attempts: u32,
        last_error: Box<OutpostError>,
    },
}

pub type Result<T> = std::result::Result<T, OutpostError>;

impl OutpostError {
    /// Whether retrying the same operation can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            OutpostError::TransientNetwork { .. } | OutpostError::RateLimited { .. }
        )
    }

    /// Shorthand for a transient network failure against an external service.
    pub fn network(service: impl Into<String>, error: impl std::fmt::Display) -> Self {
        OutpostError::TransientNetwork {
            service: service.into(),
            error: error.to_string(),
        }
    }

    /// Shorthand for an unparseable response from an external service.
    pub fn protocol(service: impl Into<String>, message: impl std::fmt::Display) -> Self {
        OutpostError::ProtocolParse {
            service: service.into(),
            message: message.to_string(),
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for OutpostError {
    fn from(err: sqlx::Error) -> Self {
        OutpostError::DatabaseError {
            message: err.to_string(),
        }
    }
}
