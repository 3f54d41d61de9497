//! Unified error types for offgrid.
//!
//! Every variant renders with a stable code prefix so hosts can match on
//! the code without parsing the message.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use serde_json::json;
use tokio_rusqlite::rusqlite;

/// Unified error types shared by the interceptor, the retry queue and the host coordinator.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., an unknown HTTP method).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Invalid or unsupported URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// The transport could not reach the network. Transient.
    #[error("NETWORK_FAILURE: {0}")]
    NetworkFailure(String),

    /// The network did not answer in time. Transient.
    #[error("FETCH_TIMEOUT: {0}")]
    FetchTimeout(String),

    /// No cache entry for the requested key.
    #[error("CACHE_MISS: {0}")]
    CacheMiss(String),

    /// The interceptor failed to install or activate.
    #[error("REGISTRATION_ERROR: {0}")]
    RegistrationError(String),

    /// A critical resource is missing or unreachable.
    #[error("RESOURCE_INTEGRITY: {0}")]
    ResourceIntegrity(String),

    /// A resource was served with the wrong content classification.
    #[error("MALFORMED_RESPONSE: {0}")]
    MalformedResponse(String),

    /// A queued mutation aged out of the retention window.
    #[error("RETENTION_EXPIRED: {0}")]
    RetentionExpired(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// Stored data could not be encoded or decoded.
    #[error("SERIALIZATION_ERROR: {0}")]
    Serialization(String),

    /// A mutation failed at the network layer and was persisted for replay.
    /// Code and transience are those of `source`.
    #[error("{source} (queued in {queue} as #{id})")]
    Queued {
        queue: String,
        id: i64,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "INVALID_INPUT",
            Error::InvalidUrl(_) => "INVALID_URL",
            Error::NetworkFailure(_) => "NETWORK_FAILURE",
            Error::FetchTimeout(_) => "FETCH_TIMEOUT",
            Error::CacheMiss(_) => "CACHE_MISS",
            Error::RegistrationError(_) => "REGISTRATION_ERROR",
            Error::ResourceIntegrity(_) => "RESOURCE_INTEGRITY",
            Error::MalformedResponse(_) => "MALFORMED_RESPONSE",
            Error::RetentionExpired(_) => "RETENTION_EXPIRED",
            Error::Database(_) | Error::MigrationFailed(_) => "CACHE_ERROR",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::Queued { source, .. } => source.code(),
        }
    }

    /// Whether the failure happened at the network layer and may succeed on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::NetworkFailure(_) | Error::FetchTimeout(_) => true,
            Error::Queued { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// Queue name and row id when the failed request was kept for replay.
    pub fn queued(&self) -> Option<(&str, i64)> {
        match self {
            Error::Queued { queue, id, .. } => Some((queue.as_str(), *id)),
            _ => None,
        }
    }

    /// The failure itself, without the queued marker.
    pub fn root(&self) -> &Error {
        match self {
            Error::Queued { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let code = match err.root() {
            Error::InvalidInput(_) => -32602,
            Error::CacheMiss(_) => -32001,
            Error::Database(_) | Error::MigrationFailed(_) => -32002,
            Error::InvalidUrl(_) => -32003,
            Error::FetchTimeout(_) => -32006,
            Error::NetworkFailure(_) => -32008,
            Error::RegistrationError(_) => -32013,
            Error::ResourceIntegrity(_) => -32014,
            Error::MalformedResponse(_) => -32015,
            Error::RetentionExpired(_) => -32016,
            Error::Serialization(_) | Error::Queued { .. } => -32000,
        };

        let mut data = json!({ "kind": err.code() });
        if let Some((queue, id)) = err.queued() {
            data["queued"] = json!({ "queue": queue, "id": id });
        }

        McpError { code: ErrorCode(code), message: err.to_string().into(), data: Some(data) }
    }
}
