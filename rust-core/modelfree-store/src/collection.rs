// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//! Collection handles.
//!
//! A `Collection` is a name plus a shared backend. It caches nothing, so
//! every handle with the same name on the same store sees the same data.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use modelfree_backend::{callback, Backend, ChangeEvent, KeyGenerator, Record, SubscriptionId};
use modelfree_backend::notify::SubscriberError;

use crate::document::{into_object, Document, ID_FIELD};
use crate::error::{ModelError, ModelResult};

/// A named set of documents in a [`ModelFree`](crate::ModelFree) store.
#[derive(Clone)]
pub struct Collection {
    name: Arc<str>,
    key_size: Option<usize>,
    backend: Arc<dyn Backend>,
    keys: Arc<dyn KeyGenerator>,
}

impl Collection {
    pub(crate) fn new(
        name: &str,
        key_size: Option<usize>,
        backend: Arc<dyn Backend>,
        keys: Arc<dyn KeyGenerator>,
    ) -> Self {
        Self {
            name: Arc::from(name),
            key_size,
            backend,
            keys,
        }
    }

    /// Collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key size fixed for this collection, provisioning it if needed.
    pub async fn key_size(&self) -> ModelResult<usize> {
        Ok(self.backend.ensure_collection(&self.name, self.key_size).await?)
    }

    /// Number of stored documents.
    pub async fn count(&self) -> ModelResult<u64> {
        Ok(self.backend.count(&self.name).await?)
    }

    /// Build an unsaved document from a JSON object.
    ///
    /// A string `_id` property becomes the key; otherwise a key of the
    /// collection's key size is generated.
    pub async fn document(&self, properties: Value) -> ModelResult<Document> {
        let mut fields = into_object(properties, &self.name)?;
        let key = match fields.remove(ID_FIELD) {
            Some(Value::String(key)) => key,
            Some(other) => {
                return Err(ModelError::InvalidDocument(format!(
                    "'{ID_FIELD}' must be a string, got {other}"
                )))
            }
            None => self.keys.generate(self.key_size().await?),
        };
        Ok(Document::new(self.clone(), key, fields))
    }

    /// Build a document from `properties` and save it.
    #[instrument(skip(self, properties), fields(collection = %self.name))]
    pub async fn create(&self, properties: Value) -> ModelResult<Document> {
        let doc = self.document(properties).await?;
        doc.save().await?;
        debug!(key = doc.key(), "document created");
        Ok(doc)
    }

    /// Serialize `value` and save it as a new document.
    pub async fn create_from<T: Serialize>(&self, value: &T) -> ModelResult<Document> {
        self.create(serde_json::to_value(value)?).await
    }

    /// Fetch a document by key.
    pub async fn get(&self, key: &str) -> ModelResult<Option<Document>> {
        self.backend
            .get_by_key(&self.name, key)
            .await?
            .map(|value| Document::from_record(self.clone(), Record::new(key, value)))
            .transpose()
    }

    /// A uniformly sampled document, or `None` when empty.
    pub async fn random(&self) -> ModelResult<Option<Document>> {
        self.backend
            .random_one(&self.name)
            .await?
            .map(|record| Document::from_record(self.clone(), record))
            .transpose()
    }

    /// Every stored document, in no guaranteed order.
    pub async fn all(&self) -> ModelResult<Vec<Document>> {
        self.backend
            .all(&self.name)
            .await?
            .into_iter()
            .map(|record| Document::from_record(self.clone(), record))
            .collect()
    }

    /// Delete the document stored under `key`. Returns whether it existed.
    pub async fn delete(&self, key: &str) -> ModelResult<bool> {
        let removed = self.backend.delete_by_key(&self.name, key).await?;
        debug!(collection = %self.name, key, removed, "delete");
        Ok(removed)
    }

    /// Delete every document.
    #[instrument(skip(self), fields(collection = %self.name))]
    pub async fn delete_all(&self) -> ModelResult<()> {
        self.backend.delete_all(&self.name).await?;
        debug!("collection cleared");
        Ok(())
    }

    /// Call `f` after every committed write to this collection.
    ///
    /// A callback that fails or panics is dropped.
    pub async fn subscribe<F>(&self, f: F) -> ModelResult<SubscriptionId>
    where
        F: Fn(&ChangeEvent) -> Result<(), SubscriberError> + Send + Sync + 'static,
    {
        Ok(self.backend.subscribe(&self.name, callback(f)).await?)
    }

    /// Remove a subscription made with [`Collection::subscribe`].
    pub async fn unsubscribe(&self, id: SubscriptionId) -> ModelResult<bool> {
        Ok(self.backend.unsubscribe(&self.name, id).await?)
    }

    pub(crate) async fn save(&self, doc: &Document) -> ModelResult<()> {
        self.backend
            .upsert(&self.name, doc.key(), &doc.value())
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("backend", &self.backend.name())
            .finish()
    }
}
