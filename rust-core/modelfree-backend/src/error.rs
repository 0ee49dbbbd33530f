// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Storage error types for the ModelFree backend abstraction.
//
// One enum covers every failure a backend may report: bad construction
// arguments, collections that were never provisioned, invalid keys, driver
// and query failures, payload (de)serialization, and use after dispose.

use thiserror::Error;

/// Errors that can occur when interacting with a collection backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Missing or invalid construction arguments.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The key size of a collection that was never referenced was requested.
    #[error("collection not provisioned: {0}")]
    NotProvisioned(String),

    /// A caller supplied an unusable argument (e.g. an empty key).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The underlying storage engine failed (connection loss, query error).
    #[error("backend error: {message}")]
    Backend {
        /// Driver or engine error text.
        message: String,
        /// The statement that failed, when one was being executed.
        statement: Option<String>,
    },

    /// Failed to serialize or deserialize a stored value.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// The stored data is in an unexpected format.
    #[error("corrupted data: {0}")]
    CorruptedData(String),

    /// The backend was disposed and can no longer serve requests.
    #[error("backend disposed")]
    Disposed,
}

impl StorageError {
    /// Build a [`StorageError::Backend`] without an associated statement.
    pub fn backend(message: impl Into<String>) -> Self {
        StorageError::Backend {
            message: message.into(),
            statement: None,
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::SerializationError(err.to_string())
    }
}

/// Result alias used by every backend operation.
pub type StorageResult<T> = Result<T, StorageError>;
