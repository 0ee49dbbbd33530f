// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//! Property-based tests for collections and key generation

use std::collections::BTreeSet;

use modelfree_backend::{KeyGenerator, MemoryBackend, RandomKeyGenerator, SeededKeyGenerator};
use modelfree_store::ModelFree;
use proptest::prelude::*;
use serde_json::{json, Map, Value};

/// Generate arbitrary document keys
fn arb_key() -> impl Strategy<Value = String> {
    "[a-z0-9]{1,31}"
}

/// Generate arbitrary JSON leaves, including finite floats
fn arb_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        any::<f64>()
            .prop_filter("JSON has no NaN or infinity", |f| f.is_finite())
            .prop_map(|f| json!(f)),
        "[ -~]{0,24}".prop_map(Value::String),
    ]
}

/// Generate arbitrary nested JSON values
fn arb_value() -> impl Strategy<Value = Value> {
    arb_leaf().prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,8}", inner, 0..6)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

/// Generate arbitrary document bodies (objects without `_id`)
fn arb_fields() -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::btree_map("[a-z]{1,8}", arb_value(), 0..8)
        .prop_map(|m| m.into_iter().collect())
}

proptest! {
    #[test]
    fn test_get_returns_last_saved_value(
        key in arb_key(),
        first in arb_fields(),
        second in arb_fields()
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let mf = ModelFree::new(MemoryBackend::new());
            let widgets = mf.collection("widgets").unwrap();

            let mut props = first.clone();
            props.insert("_id".into(), json!(key));
            widgets.create(Value::Object(props)).await.unwrap();

            let mut props = second.clone();
            props.insert("_id".into(), json!(key));
            widgets.create(Value::Object(props)).await.unwrap();

            let fetched = widgets.get(&key).await.unwrap().unwrap();
            prop_assert_eq!(fetched.fields(), &second);
            prop_assert_eq!(widgets.count().await.unwrap(), 1);

            Ok(())
        })?;
    }

    #[test]
    fn test_delete_then_get_is_absent(key in arb_key(), fields in arb_fields()) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let mf = ModelFree::new(MemoryBackend::new());
            let widgets = mf.collection("widgets").unwrap();

            let mut props = fields;
            props.insert("_id".into(), json!(key));
            widgets.create(Value::Object(props)).await.unwrap();

            prop_assert!(widgets.delete(&key).await.unwrap());
            prop_assert!(widgets.get(&key).await.unwrap().is_none());
            prop_assert!(!widgets.delete(&key).await.unwrap());

            Ok(())
        })?;
    }

    #[test]
    fn test_count_is_inserted_minus_deleted(
        keys in prop::collection::btree_set(arb_key(), 0..40),
        delete_mask in prop::collection::vec(any::<bool>(), 40)
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let mf = ModelFree::new(MemoryBackend::new());
            let widgets = mf.collection("widgets").unwrap();

            for key in &keys {
                widgets.create(json!({"_id": key})).await.unwrap();
            }
            let mut deleted = 0u64;
            for (key, delete) in keys.iter().zip(&delete_mask) {
                if *delete {
                    widgets.delete(key).await.unwrap();
                    deleted += 1;
                }
            }

            prop_assert_eq!(widgets.count().await.unwrap(), keys.len() as u64 - deleted);
            prop_assert_eq!(widgets.all().await.unwrap().len() as u64, keys.len() as u64 - deleted);

            Ok(())
        })?;
    }

    #[test]
    fn test_random_on_single_document(key in arb_key(), fields in arb_fields()) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let mf = ModelFree::new(MemoryBackend::new());
            let widgets = mf.collection("widgets").unwrap();
            prop_assert!(widgets.random().await.unwrap().is_none());

            let mut props = fields.clone();
            props.insert("_id".into(), json!(key));
            widgets.create(Value::Object(props)).await.unwrap();

            for _ in 0..5 {
                let picked = widgets.random().await.unwrap().unwrap();
                prop_assert_eq!(picked.key(), key.as_str());
                prop_assert_eq!(picked.fields(), &fields);
            }

            Ok(())
        })?;
    }

    #[test]
    fn test_json_fidelity_through_serialization(fields in arb_fields()) {
        // The relational backend stores values as text.
        let text = serde_json::to_string(&Value::Object(fields.clone())).unwrap();
        let back: Value = serde_json::from_str(&text).unwrap();
        prop_assert_eq!(back, Value::Object(fields));
    }

    #[test]
    fn test_float_bits_survive_serialization(f in any::<f64>().prop_filter("finite", |f| f.is_finite())) {
        let text = serde_json::to_string(&json!({"n": f})).unwrap();
        let back: Value = serde_json::from_str(&text).unwrap();
        prop_assert_eq!(back["n"].as_f64().unwrap().to_bits(), f.to_bits());
    }

    #[test]
    fn test_generated_keys_have_exact_length(length in 1usize..128, seed in any::<u64>()) {
        let key = SeededKeyGenerator::new(seed).generate(length);
        prop_assert_eq!(key.len(), length);
        prop_assert!(key.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()));
    }

    #[test]
    fn test_seeded_generator_is_deterministic(seed in any::<u64>()) {
        let a = SeededKeyGenerator::new(seed);
        let b = SeededKeyGenerator::new(seed);
        for _ in 0..4 {
            prop_assert_eq!(a.generate(31), b.generate(31));
        }
    }
}

#[test]
fn test_thousand_keys_are_distinct() {
    let generator = RandomKeyGenerator::new();
    let keys: BTreeSet<String> = (0..1000).map(|_| generator.generate(31)).collect();
    assert_eq!(keys.len(), 1000);
}
