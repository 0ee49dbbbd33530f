// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//! The top-level store handle.

use std::sync::Arc;

use tracing::info;

use modelfree_backend::{Backend, KeyGenerator, RandomKeyGenerator};

use crate::collection::Collection;
use crate::error::{ModelError, ModelResult};

/// Owns one backend and hands out [`Collection`] handles over it.
///
/// Cloning is cheap; clones share the backend.
#[derive(Clone)]
pub struct ModelFree {
    backend: Arc<dyn Backend>,
    keys: Arc<dyn KeyGenerator>,
}

impl ModelFree {
    /// Wrap `backend`, generating keys with [`RandomKeyGenerator`].
    pub fn new<B: Backend + 'static>(backend: B) -> Self {
        Self::from_arc(Arc::new(backend))
    }

    /// Wrap an already shared backend.
    pub fn from_arc(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            keys: Arc::new(RandomKeyGenerator::new()),
        }
    }

    /// Replace the key generator used for documents without an `_id`.
    pub fn with_key_generator<K: KeyGenerator + 'static>(mut self, keys: K) -> Self {
        self.keys = Arc::new(keys);
        self
    }

    /// A handle on the collection `name`.
    ///
    /// No I/O happens here; the collection is provisioned with the
    /// backend's default key size on first use.
    pub fn collection(&self, name: &str) -> ModelResult<Collection> {
        self.handle(name, None)
    }

    /// A handle on the collection `name`, provisioning it now with
    /// `key_size` unless its key size is already fixed.
    pub async fn collection_with_key_size(&self, name: &str, key_size: usize) -> ModelResult<Collection> {
        let collection = self.handle(name, Some(key_size))?;
        self.backend.ensure_collection(name, Some(key_size)).await?;
        Ok(collection)
    }

    /// The backend behind this store.
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Release backend resources. Stored data is kept.
    pub async fn destroy(&self) -> ModelResult<()> {
        self.backend.dispose().await?;
        info!(backend = self.backend.name(), "store destroyed");
        Ok(())
    }

    fn handle(&self, name: &str, key_size: Option<usize>) -> ModelResult<Collection> {
        if name.is_empty() {
            return Err(ModelError::Configuration(
                "collection name must not be empty".to_string(),
            ));
        }
        Ok(Collection::new(
            name,
            key_size,
            Arc::clone(&self.backend),
            Arc::clone(&self.keys),
        ))
    }
}

impl std::fmt::Debug for ModelFree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelFree")
            .field("backend", &self.backend.name())
            .finish_non_exhaustive()
    }
}
