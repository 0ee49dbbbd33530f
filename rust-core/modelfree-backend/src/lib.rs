// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// ModelFree Backend Abstraction
//
// This crate provides the storage side of ModelFree: named collections of
// (key, JSON document) pairs behind a single `Backend` trait, so that the
// document layer can switch between an in-process map and a PostgreSQL
// database without changing call sites.
//
// # Modules
//
// - [`backend`] -- The `Backend` trait and the `Record` row type.
// - [`error`] -- The `StorageError` enum covering all backend failure modes.
// - [`keygen`] -- Fixed-length random key generation.
// - [`notify`] -- Per-collection change subscriptions shared by backends.
// - [`memory`] -- The in-memory reference backend.
// - [`postgres`] -- The relational backend (feature `postgres`).
// - [`metrics`] -- A transparent wrapper that collects operation statistics.
// - [`config`] -- Serde-friendly backend configuration.
//
// # Example
//
// ```rust
// use modelfree_backend::backend::Backend;
// use modelfree_backend::memory::MemoryBackend;
// use modelfree_backend::metrics::MetricsBackend;
//
// # tokio_test::block_on(async {
// let metered = MetricsBackend::new(MemoryBackend::new());
//
// metered.upsert("widgets", "w1", &serde_json::json!({"name": "a"})).await.unwrap();
// let value = metered.get_by_key("widgets", "w1").await.unwrap().unwrap();
// assert_eq!(value["name"], "a");
// assert_eq!(metered.count("widgets").await.unwrap(), 1);
// # });
// ```

pub mod backend;
pub mod config;
pub mod error;
pub mod keygen;
pub mod memory;
pub mod metrics;
pub mod notify;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use backend::{Backend, Record};
pub use config::{MemoryConfig, PostgresConfig};
pub use error::{StorageError, StorageResult};
pub use keygen::{KeyGenerator, RandomKeyGenerator, SeededKeyGenerator, DEFAULT_KEY_SIZE};
pub use memory::MemoryBackend;
pub use metrics::{BackendStats, MetricsBackend};
pub use notify::{callback, ChangeCallback, ChangeEvent, ChangeNotifier, SubscriptionId};

#[cfg(feature = "postgres")]
pub use postgres::PostgresBackend;
