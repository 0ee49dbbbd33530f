// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//! ModelFree document layer
//!
//! Collections of schemaless JSON documents over any
//! [`Backend`](modelfree_backend::Backend). Application code talks to
//! [`ModelFree`], [`Collection`] and [`Document`]; switching between the
//! in-memory and PostgreSQL backends changes only the constructor call.
//!
//! ```rust
//! use modelfree_backend::MemoryBackend;
//! use modelfree_store::ModelFree;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let mf = ModelFree::new(MemoryBackend::new());
//! let widgets = mf.collection("widgets").unwrap();
//!
//! let widget = widgets.create(json!({"name": "my widget"})).await.unwrap();
//! let again = widgets.get(widget.key()).await.unwrap().unwrap();
//! assert_eq!(again.get("name"), Some(&json!("my widget")));
//!
//! mf.destroy().await.unwrap();
//! # });
//! ```

pub mod collection;
pub mod document;
pub mod error;
pub mod store;

pub use collection::Collection;
pub use document::Document;
pub use error::{ModelError, ModelResult};
pub use store::ModelFree;

pub use modelfree_backend as backend;
