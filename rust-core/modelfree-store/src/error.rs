// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//! Error types for the document layer.

use modelfree_backend::StorageError;
use thiserror::Error;

/// Errors surfaced by [`ModelFree`](crate::ModelFree), collections and documents.
#[derive(Error, Debug)]
pub enum ModelError {
    /// Invalid store or collection setup, such as an empty collection name.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Properties that cannot form a document.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Failure reported by the backend.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Conversion between documents and typed values failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience alias used throughout the document layer.
pub type ModelResult<T> = Result<T, ModelError>;
