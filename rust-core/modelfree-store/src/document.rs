// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//! Documents: a property bag bound to a key and an owning collection.
//!
//! A `Document` is a view materialised from a backend record or built from
//! application properties. It is not the source of truth; changes made with
//! [`Document::set`] and [`Document::remove`] reach the backend only on
//! [`Document::save`].

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use modelfree_backend::Record;

use crate::collection::Collection;
use crate::error::{ModelError, ModelResult};

/// Property name that carries a caller-supplied key.
pub const ID_FIELD: &str = "_id";

/// A document in a [`Collection`].
///
/// The key is fixed at construction and never stored inside the field map.
#[derive(Clone)]
pub struct Document {
    key: String,
    fields: Map<String, Value>,
    collection: Collection,
}

impl Document {
    pub(crate) fn new(collection: Collection, key: String, fields: Map<String, Value>) -> Self {
        Self {
            key,
            fields,
            collection,
        }
    }

    /// Rebuild a document from a stored record.
    pub(crate) fn from_record(collection: Collection, record: Record) -> ModelResult<Self> {
        let Record { key, value } = record;
        let mut fields = into_object(value, collection.name())?;
        fields.remove(ID_FIELD);
        Ok(Self::new(collection, key, fields))
    }

    /// The document key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// A field value, if present.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Set a field, returning the previous value.
    ///
    /// The key cannot be changed through the field map, so setting `_id`
    /// fails with [`ModelError::InvalidDocument`].
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> ModelResult<Option<Value>> {
        let field = field.into();
        if field == ID_FIELD {
            return Err(ModelError::InvalidDocument(format!(
                "'{ID_FIELD}' is the document key and cannot be set as a field"
            )));
        }
        Ok(self.fields.insert(field, value.into()))
    }

    /// Remove a field, returning its value.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    /// All fields, without the key.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// The payload written to the backend: the fields as a JSON object.
    pub fn value(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    /// Deserialize the fields into a typed value.
    pub fn deserialize<T: DeserializeOwned>(&self) -> ModelResult<T> {
        Ok(serde_json::from_value(self.value())?)
    }

    /// The owning collection.
    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    /// Write the document, inserting it or replacing the stored value.
    pub async fn save(&self) -> ModelResult<()> {
        self.collection.save(self).await
    }

    /// Delete the stored document. Returns whether it existed.
    pub async fn delete(&self) -> ModelResult<bool> {
        self.collection.delete(&self.key).await
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("collection", &self.collection.name())
            .field("key", &self.key)
            .field("fields", &self.fields)
            .finish()
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.collection.name() == other.collection.name()
            && self.key == other.key
            && self.fields == other.fields
    }
}

/// Require an object and hand back its map.
pub(crate) fn into_object(value: Value, collection: &str) -> ModelResult<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(ModelError::InvalidDocument(format!(
            "documents in '{collection}' must be JSON objects, got {}",
            kind(&other)
        ))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
