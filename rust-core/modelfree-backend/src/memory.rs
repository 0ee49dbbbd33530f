// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory backend for ModelFree.
//
// Each collection is an append/lookup vector of records, created on first
// reference with the key size supplied at that time. The whole map sits
// behind a tokio `RwLock`; every operation completes without waiting on
// I/O and is immediately visible to the next call. Change callbacks fire
// synchronously after the lock is released.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::backend::{check_key_fits, check_key_size, require_key, Backend, Record};
use crate::config::MemoryConfig;
use crate::error::{StorageError, StorageResult};
use crate::notify::{ChangeCallback, ChangeNotifier, SubscriptionId};

#[derive(Debug)]
struct MemoryTable {
    key_size: usize,
    entries: Vec<Record>,
}

impl MemoryTable {
    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|r| r.key == key)
    }
}

#[derive(Debug, Default)]
struct Shared {
    tables: RwLock<HashMap<String, MemoryTable>>,
    notifier: ChangeNotifier,
    disposed: AtomicBool,
}

/// An in-process backend holding every collection in memory.
///
/// All data is lost on drop. Clones share state, so two handles created
/// from the same backend always observe the same collections.
///
/// # Example
///
/// ```rust
/// use modelfree_backend::backend::Backend;
/// use modelfree_backend::memory::MemoryBackend;
///
/// # tokio_test::block_on(async {
/// let backend = MemoryBackend::new();
/// backend.upsert("widgets", "w1", &serde_json::json!({"name": "a"})).await.unwrap();
/// assert_eq!(backend.count("widgets").await.unwrap(), 1);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    config: MemoryConfig,
    shared: Arc<Shared>,
}

impl MemoryBackend {
    /// Create an empty backend with default configuration.
    pub fn new() -> Self {
        Self::with_config(MemoryConfig::default())
    }

    /// Create an empty backend with the given configuration.
    pub fn with_config(config: MemoryConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared::default()),
        }
    }

    /// Names of every provisioned collection.
    pub async fn collections(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shared.tables.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    fn check_open(&self) -> StorageResult<()> {
        if self.shared.disposed.load(Ordering::Acquire) {
            return Err(StorageError::Disposed);
        }
        Ok(())
    }

    fn default_key_size(&self) -> StorageResult<usize> {
        check_key_size(self.config.key_size)
    }

    /// Provision `name` while already holding the write lock.
    fn provision<'a>(
        tables: &'a mut HashMap<String, MemoryTable>,
        name: &str,
        key_size: usize,
    ) -> &'a mut MemoryTable {
        tables.entry(name.to_string()).or_insert_with(|| MemoryTable {
            key_size,
            entries: Vec::new(),
        })
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn ensure_collection(&self, name: &str, key_size: Option<usize>) -> StorageResult<usize> {
        self.check_open()?;
        let requested = match key_size {
            Some(size) => check_key_size(size)?,
            None => self.default_key_size()?,
        };
        let mut tables = self.shared.tables.write().await;
        Ok(Self::provision(&mut tables, name, requested).key_size)
    }

    async fn key_size(&self, name: &str) -> StorageResult<usize> {
        self.check_open()?;
        self.shared
            .tables
            .read()
            .await
            .get(name)
            .map(|t| t.key_size)
            .ok_or_else(|| StorageError::NotProvisioned(name.to_string()))
    }

    async fn count(&self, name: &str) -> StorageResult<u64> {
        self.check_open()?;
        let default = self.default_key_size()?;
        let mut tables = self.shared.tables.write().await;
        Ok(Self::provision(&mut tables, name, default).entries.len() as u64)
    }

    async fn upsert(&self, name: &str, key: &str, value: &Value) -> StorageResult<()> {
        self.check_open()?;
        let default = self.default_key_size()?;
        {
            let mut tables = self.shared.tables.write().await;
            let table = Self::provision(&mut tables, name, default);
            check_key_fits(name, key, table.key_size)?;
            match table.position(key) {
                Some(idx) => table.entries[idx].value = value.clone(),
                None => table.entries.push(Record::new(key, value.clone())),
            }
        }
        self.shared.notifier.notify(name, key);
        Ok(())
    }

    async fn get_by_key(&self, name: &str, key: &str) -> StorageResult<Option<Value>> {
        self.check_open()?;
        let default = self.default_key_size()?;
        let mut tables = self.shared.tables.write().await;
        let table = Self::provision(&mut tables, name, default);
        Ok(table.position(key).map(|idx| table.entries[idx].value.clone()))
    }

    async fn all(&self, name: &str) -> StorageResult<Vec<Record>> {
        self.check_open()?;
        let default = self.default_key_size()?;
        let mut tables = self.shared.tables.write().await;
        Ok(Self::provision(&mut tables, name, default).entries.clone())
    }

    async fn random_one(&self, name: &str) -> StorageResult<Option<Record>> {
        self.check_open()?;
        let tables = self.shared.tables.read().await;
        let Some(table) = tables.get(name) else {
            return Ok(None);
        };
        if table.entries.is_empty() {
            return Ok(None);
        }
        let idx = rand::thread_rng().gen_range(0..table.entries.len());
        Ok(Some(table.entries[idx].clone()))
    }

    async fn delete_by_key(&self, name: &str, key: &str) -> StorageResult<bool> {
        self.check_open()?;
        require_key(key, "delete")?;
        let mut tables = self.shared.tables.write().await;
        let Some(table) = tables.get_mut(name) else {
            return Ok(false);
        };
        match table.position(key) {
            Some(idx) => {
                table.entries.remove(idx);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_all(&self, name: &str) -> StorageResult<()> {
        self.check_open()?;
        if let Some(table) = self.shared.tables.write().await.get_mut(name) {
            table.entries.clear();
        }
        Ok(())
    }

    async fn subscribe(&self, name: &str, callback: ChangeCallback) -> StorageResult<SubscriptionId> {
        self.ensure_collection(name, None).await?;
        Ok(self.shared.notifier.subscribe(name, callback))
    }

    async fn unsubscribe(&self, name: &str, id: SubscriptionId) -> StorageResult<bool> {
        self.check_open()?;
        Ok(self.shared.notifier.unsubscribe(name, id))
    }

    async fn dispose(&self) -> StorageResult<()> {
        // Nothing external to release; the flag makes later calls fail loudly.
        if !self.shared.disposed.swap(true, Ordering::AcqRel) {
            self.shared.notifier.clear();
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}
