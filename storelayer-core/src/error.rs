//! Error types and result types for persistence operations.
//!
//! Every coordinator and adapter operation returns a [`StoreResult<T>`]. The
//! [`StoreError`] variants map onto HTTP-style status codes through
//! [`StoreError::status_code`], so callers can treat a missing record as a 404
//! and a duplicate id as a 409 regardless of the backend that produced them.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when talking to a storage backend.
///
/// `NotFound` and `Conflict` are control-flow signals: they are surfaced to the
/// caller unchanged and are never retried by the coordinator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The requested record does not exist.
    #[error("Record {id} not found for model {model}")]
    NotFound {
        /// Model the lookup was scoped to.
        model: String,
        /// Identifier that could not be resolved.
        id: String,
    },
    /// A create-with-id targeted an identifier that already exists.
    #[error("Record {id} already exists for model {model}")]
    Conflict {
        /// Model the write was scoped to.
        model: String,
        /// Identifier that collided.
        id: String,
    },
    /// A required connection precondition is missing or the backend is unreachable.
    #[error("Connection error: {0}")]
    Connection(String),
    /// Opaque passthrough of any other backend failure.
    ///
    /// `status` carries the backend's own status indicator when it has one.
    #[error("Backend error: {message}")]
    Backend {
        /// Backend status indicator, normalized to an HTTP-style code.
        status: Option<u16>,
        /// Backend supplied message.
        message: String,
    },
    /// Serialization/deserialization error when converting between value formats.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// The record is malformed for the requested operation.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
    /// The adapter does not implement the requested primitive.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

/// A specialized `Result` type for persistence operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// Builds a [`StoreError::NotFound`] for the given model and id.
    pub fn not_found(model: impl Into<String>, id: impl ToString) -> Self {
        StoreError::NotFound {
            model: model.into(),
            id: id.to_string(),
        }
    }

    /// Builds a [`StoreError::Conflict`] for the given model and id.
    pub fn conflict(model: impl Into<String>, id: impl ToString) -> Self {
        StoreError::Conflict {
            model: model.into(),
            id: id.to_string(),
        }
    }

    /// Builds a [`StoreError::Backend`] without a status indicator.
    pub fn backend(message: impl ToString) -> Self {
        StoreError::Backend {
            status: None,
            message: message.to_string(),
        }
    }

    /// Builds a [`StoreError::Backend`] carrying the backend's status indicator.
    pub fn backend_with_status(status: u16, message: impl ToString) -> Self {
        StoreError::Backend {
            status: Some(status),
            message: message.to_string(),
        }
    }

    /// Returns the HTTP-style status code this error normalizes to.
    pub fn status_code(&self) -> u16 {
        match self {
            StoreError::NotFound { .. } => 404,
            StoreError::Conflict { .. } => 409,
            StoreError::Connection(_) => 503,
            StoreError::Backend { status, .. } => status.unwrap_or(500),
            StoreError::Serialization(_) | StoreError::InvalidRecord(_) => 400,
            StoreError::Unsupported(_) => 501,
        }
    }

    /// Returns `true` for [`StoreError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// Returns `true` for [`StoreError::Conflict`].
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

impl From<BsonError> for StoreError {
    fn from(err: BsonError) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for StoreError {
    fn from(err: SerdeJsonError) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
