// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Metrics-collecting wrapper for ModelFree backends.
//
// Wraps any `Backend` and transparently collects operation counts, latency
// sums and document transfer totals.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::backend::{Backend, Record};
use crate::error::StorageResult;
use crate::notify::{ChangeCallback, SubscriptionId};

/// Accumulated statistics for a backend.
///
/// All counters are monotonically increasing for the lifetime of the
/// [`MetricsBackend`] that owns them, until [`MetricsBackend::reset_stats`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendStats {
    /// Number of `count` operations performed.
    pub count_calls: u64,
    /// Number of `get_by_key` operations performed.
    pub get_count: u64,
    /// Number of `upsert` operations performed.
    pub upsert_count: u64,
    /// Number of `delete_by_key` and `delete_all` operations performed.
    pub delete_count: u64,
    /// Number of `all` operations performed.
    pub scan_count: u64,
    /// Number of `random_one` operations performed.
    pub random_count: u64,
    /// Number of failed operations of any kind.
    pub error_count: u64,
    /// Cumulative wall-clock latency of all `get_by_key` calls, in milliseconds.
    pub get_latency_sum_ms: f64,
    /// Cumulative wall-clock latency of all `upsert` calls, in milliseconds.
    pub upsert_latency_sum_ms: f64,
    /// Documents returned by `get_by_key`, `all` and `random_one`.
    pub documents_read: u64,
    /// Documents successfully written by `upsert`.
    pub documents_written: u64,
}

/// A backend wrapper that collects operation metrics.
///
/// # Example
///
/// ```rust
/// use modelfree_backend::backend::Backend;
/// use modelfree_backend::memory::MemoryBackend;
/// use modelfree_backend::metrics::MetricsBackend;
///
/// # tokio_test::block_on(async {
/// let metered = MetricsBackend::new(MemoryBackend::new());
///
/// metered.upsert("widgets", "k", &serde_json::json!({})).await.unwrap();
/// metered.get_by_key("widgets", "k").await.unwrap();
///
/// let stats = metered.stats().await;
/// assert_eq!(stats.upsert_count, 1);
/// assert_eq!(stats.get_count, 1);
/// # });
/// ```
pub struct MetricsBackend<B: Backend> {
    inner: B,
    stats: Arc<RwLock<BackendStats>>,
}

impl<B: Backend> MetricsBackend<B> {
    /// Wrap `inner` with metrics collection.
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            stats: Arc::new(RwLock::new(BackendStats::default())),
        }
    }

    /// Return a snapshot of the current statistics.
    pub async fn stats(&self) -> BackendStats {
        self.stats.read().await.clone()
    }

    /// Reset all statistics to zero.
    pub async fn reset_stats(&self) {
        let mut s = self.stats.write().await;
        *s = BackendStats::default();
    }

    /// Return a reference to the inner backend.
    pub fn inner(&self) -> &B {
        &self.inner
    }

    async fn record_error<T>(&self, result: &StorageResult<T>) {
        if result.is_err() {
            self.stats.write().await.error_count += 1;
        }
    }
}

#[async_trait]
impl<B: Backend> Backend for MetricsBackend<B> {
    async fn ensure_collection(&self, name: &str, key_size: Option<usize>) -> StorageResult<usize> {
        let result = self.inner.ensure_collection(name, key_size).await;
        self.record_error(&result).await;
        result
    }

    async fn key_size(&self, name: &str) -> StorageResult<usize> {
        self.inner.key_size(name).await
    }

    async fn count(&self, name: &str) -> StorageResult<u64> {
        let result = self.inner.count(name).await;
        self.stats.write().await.count_calls += 1;
        self.record_error(&result).await;
        result
    }

    async fn upsert(&self, name: &str, key: &str, value: &Value) -> StorageResult<()> {
        let start = Instant::now();
        let result = self.inner.upsert(name, key, value).await;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        let mut s = self.stats.write().await;
        s.upsert_count += 1;
        s.upsert_latency_sum_ms += elapsed_ms;
        match result {
            Ok(()) => s.documents_written += 1,
            Err(_) => s.error_count += 1,
        }

        result
    }

    async fn get_by_key(&self, name: &str, key: &str) -> StorageResult<Option<Value>> {
        let start = Instant::now();
        let result = self.inner.get_by_key(name, key).await;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        let mut s = self.stats.write().await;
        s.get_count += 1;
        s.get_latency_sum_ms += elapsed_ms;
        match result {
            Ok(Some(_)) => s.documents_read += 1,
            Ok(None) => {}
            Err(_) => s.error_count += 1,
        }

        result
    }

    async fn all(&self, name: &str) -> StorageResult<Vec<Record>> {
        let result = self.inner.all(name).await;

        let mut s = self.stats.write().await;
        s.scan_count += 1;
        match result {
            Ok(ref records) => s.documents_read += records.len() as u64,
            Err(_) => s.error_count += 1,
        }

        result
    }

    async fn random_one(&self, name: &str) -> StorageResult<Option<Record>> {
        let result = self.inner.random_one(name).await;

        let mut s = self.stats.write().await;
        s.random_count += 1;
        match result {
            Ok(Some(_)) => s.documents_read += 1,
            Ok(None) => {}
            Err(_) => s.error_count += 1,
        }

        result
    }

    async fn delete_by_key(&self, name: &str, key: &str) -> StorageResult<bool> {
        let mut s = self.stats.write().await;
        s.delete_count += 1;
        drop(s); // Release lock before the potentially slow operation.
        let result = self.inner.delete_by_key(name, key).await;
        self.record_error(&result).await;
        result
    }

    async fn delete_all(&self, name: &str) -> StorageResult<()> {
        self.stats.write().await.delete_count += 1;
        let result = self.inner.delete_all(name).await;
        self.record_error(&result).await;
        result
    }

    async fn subscribe(&self, name: &str, callback: ChangeCallback) -> StorageResult<SubscriptionId> {
        self.inner.subscribe(name, callback).await
    }

    async fn unsubscribe(&self, name: &str, id: SubscriptionId) -> StorageResult<bool> {
        self.inner.unsubscribe(name, id).await
    }

    async fn dispose(&self) -> StorageResult<()> {
        self.inner.dispose().await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use serde_json::json;

    #[tokio::test]
    async fn test_get_increments_count() {
        let metered = MetricsBackend::new(MemoryBackend::new());

        metered.upsert("c", "k", &json!({"v": 1})).await.unwrap();
        metered.get_by_key("c", "k").await.unwrap();
        metered.get_by_key("c", "k").await.unwrap();
        metered.get_by_key("c", "missing").await.unwrap();

        let stats = metered.stats().await;
        assert_eq!(stats.get_count, 3);
        assert_eq!(stats.upsert_count, 1);
        // Only the two hits count as documents read.
        assert_eq!(stats.documents_read, 2);
    }

    #[tokio::test]
    async fn test_failed_upsert_counts_error() {
        let metered = MetricsBackend::new(MemoryBackend::new());
        metered.ensure_collection("c", Some(2)).await.unwrap();

        assert!(metered.upsert("c", "too-long", &json!({})).await.is_err());

        let stats = metered.stats().await;
        assert_eq!(stats.upsert_count, 1);
        assert_eq!(stats.documents_written, 0);
        assert_eq!(stats.error_count, 1);
    }

    #[tokio::test]
    async fn test_scan_and_random_count_documents() {
        let metered = MetricsBackend::new(MemoryBackend::new());
        metered.upsert("c", "a", &json!(1)).await.unwrap();
        metered.upsert("c", "b", &json!(2)).await.unwrap();

        assert_eq!(metered.all("c").await.unwrap().len(), 2);
        assert!(metered.random_one("c").await.unwrap().is_some());

        let stats = metered.stats().await;
        assert_eq!(stats.scan_count, 1);
        assert_eq!(stats.random_count, 1);
        assert_eq!(stats.documents_read, 3);
        assert_eq!(stats.documents_written, 2);
    }

    #[tokio::test]
    async fn test_delete_increments_count() {
        let metered = MetricsBackend::new(MemoryBackend::new());

        metered.upsert("c", "k", &json!({})).await.unwrap();
        metered.delete_by_key("c", "k").await.unwrap();
        metered.delete_by_key("c", "nope").await.unwrap();
        metered.delete_all("c").await.unwrap();

        let stats = metered.stats().await;
        assert_eq!(stats.delete_count, 3);
        assert_eq!(stats.error_count, 0);
    }

    #[tokio::test]
    async fn test_latency_is_recorded() {
        let metered = MetricsBackend::new(MemoryBackend::new());

        metered.upsert("c", "k", &json!({})).await.unwrap();
        metered.get_by_key("c", "k").await.unwrap();

        let stats = metered.stats().await;
        assert!(stats.get_latency_sum_ms >= 0.0);
        assert!(stats.upsert_latency_sum_ms >= 0.0);
    }

    #[tokio::test]
    async fn test_reset_stats() {
        let metered = MetricsBackend::new(MemoryBackend::new());

        metered.upsert("c", "a", &json!({})).await.unwrap();
        metered.count("c").await.unwrap();
        metered.reset_stats().await;

        assert_eq!(metered.stats().await, BackendStats::default());
    }

    #[tokio::test]
    async fn test_name_delegates_to_inner() {
        let metered = MetricsBackend::new(MemoryBackend::new());
        assert_eq!(metered.name(), "in-memory");
        assert_eq!(metered.inner().name(), "in-memory");
    }

    #[tokio::test]
    async fn test_dispose_delegates() {
        let metered = MetricsBackend::new(MemoryBackend::new());
        metered.dispose().await.unwrap();
        assert!(metered.count("c").await.is_err());
        assert_eq!(metered.stats().await.error_count, 1);
    }
}
