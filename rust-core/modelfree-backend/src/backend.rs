// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core backend trait for ModelFree.
//
// Defines the `Backend` trait that every storage implementation satisfies.
// Operations are addressed by collection name; each collection is a set of
// (key, JSON value) pairs with at most one entry per key. Backends are
// expected to be thread-safe (`Send + Sync`) and fully asynchronous.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{StorageError, StorageResult};
use crate::notify::{ChangeCallback, SubscriptionId};

/// One stored document: its key and its JSON payload.
///
/// The key is kept out-of-band; it is never part of `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Document key, unique within its collection.
    pub key: String,
    /// Stored payload.
    pub value: Value,
}

impl Record {
    /// Create a record.
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// A pluggable document collection backend.
///
/// Reads that find nothing return `Ok(None)`, never an error. Multi-step
/// operations are only as atomic as each implementation documents; none of
/// them retry on failure.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Idempotently provision storage for `name`.
    ///
    /// The first call for a name fixes its key size for the lifetime of
    /// the backend; later calls with a different size are ignored. `None`
    /// selects the backend's configured default. Returns the fixed size.
    async fn ensure_collection(&self, name: &str, key_size: Option<usize>) -> StorageResult<usize>;

    /// Key size fixed for `name`.
    ///
    /// Fails with [`StorageError::NotProvisioned`] if the collection was
    /// never referenced through this backend.
    async fn key_size(&self, name: &str) -> StorageResult<usize>;

    /// Number of documents in the collection, provisioning it if absent.
    async fn count(&self, name: &str) -> StorageResult<u64>;

    /// Insert a document or replace the value stored under `key`.
    async fn upsert(&self, name: &str, key: &str, value: &Value) -> StorageResult<()>;

    /// Exact lookup by key.
    async fn get_by_key(&self, name: &str, key: &str) -> StorageResult<Option<Value>>;

    /// Every stored document, in no guaranteed order.
    async fn all(&self, name: &str) -> StorageResult<Vec<Record>>;

    /// A uniformly sampled document, or `None` when the collection is empty.
    async fn random_one(&self, name: &str) -> StorageResult<Option<Record>>;

    /// Remove the document stored under `key`.
    ///
    /// Returns `Ok(true)` if a document was removed and `Ok(false)` if the
    /// key was absent. An empty key is an [`StorageError::InvalidArgument`].
    async fn delete_by_key(&self, name: &str, key: &str) -> StorageResult<bool>;

    /// Remove every document in the collection. A no-op on an empty or
    /// unprovisioned collection.
    async fn delete_all(&self, name: &str) -> StorageResult<()>;

    /// Register a callback invoked once per committed write to `name`.
    async fn subscribe(&self, name: &str, callback: ChangeCallback) -> StorageResult<SubscriptionId>;

    /// Remove a subscription. Unknown ids are a no-op returning `Ok(false)`.
    async fn unsubscribe(&self, name: &str, id: SubscriptionId) -> StorageResult<bool>;

    /// Release backend-held resources. Safe to call more than once; every
    /// other operation fails with [`StorageError::Disposed`] afterwards.
    async fn dispose(&self) -> StorageResult<()>;

    /// A human-readable name for this backend, used in logging and metrics.
    fn name(&self) -> &str;
}

/// Reject empty keys.
pub(crate) fn require_key(key: &str, op: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidArgument(format!("empty key for {op}")));
    }
    Ok(())
}

/// Reject keys that cannot fit the collection's fixed key size.
pub(crate) fn check_key_fits(name: &str, key: &str, key_size: usize) -> StorageResult<()> {
    require_key(key, "upsert")?;
    if key.chars().count() > key_size {
        return Err(StorageError::InvalidArgument(format!(
            "key '{key}' is longer than the key size {key_size} of collection '{name}'"
        )));
    }
    Ok(())
}

/// Validate a requested key size.
pub(crate) fn check_key_size(key_size: usize) -> StorageResult<usize> {
    if key_size == 0 {
        return Err(StorageError::Configuration(
            "key size must be greater than zero".to_string(),
        ));
    }
    Ok(key_size)
}
