//! Property-based tests using proptest.
//!
//! These tests verify invariants of fingerprints and records using randomly
//! generated JSON values.

use proptest::prelude::*;
use serde_json::{Map, Value};

use jarpatch::{Record, canonical_json, fingerprint};

/// Strategy for arbitrary JSON values a few levels deep.
fn json_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        (-1.0e6f64..1.0e6).prop_map(Value::from),
        ".{0,12}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::vec((".{0,8}", inner), 0..6)
                .prop_map(|fields| Value::Object(fields.into_iter().collect())),
        ]
    })
}

/// Strategy for objects as a list of uniquely named fields.
fn fields_strategy() -> impl Strategy<Value = Vec<(String, Value)>> {
    prop::collection::btree_map("[a-zA-Z_][a-zA-Z0-9_]{0,8}", json_strategy(), 0..8)
        .prop_map(|map| map.into_iter().collect())
}

fn object_from(fields: &[(String, Value)]) -> Value {
    let map: Map<String, Value> = fields.iter().cloned().collect();
    Value::Object(map)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Field order never changes a fingerprint.
    #[test]
    fn fingerprint_ignores_field_order(fields in fields_strategy()) {
        let forward = object_from(&fields);
        let mut reversed_fields = fields.clone();
        reversed_fields.reverse();
        let reversed = object_from(&reversed_fields);

        prop_assert_eq!(fingerprint(&forward), fingerprint(&reversed));
        prop_assert_eq!(canonical_json(&forward), canonical_json(&reversed));
    }

    /// Fingerprints are equal exactly when canonical forms are.
    #[test]
    fn fingerprint_tracks_canonical_form(a in json_strategy(), b in json_strategy()) {
        let same_text = canonical_json(&a) == canonical_json(&b);
        let same_hash = fingerprint(&a) == fingerprint(&b);
        prop_assert_eq!(same_text, same_hash);
    }

    /// Fingerprints have a fixed shape.
    #[test]
    fn fingerprint_format(value in json_strategy()) {
        let fp = fingerprint(&value);
        prop_assert_eq!(fp.algorithm(), Some("sha256"));
        prop_assert_eq!(fp.digest().len(), 64);
        prop_assert!(fp.digest().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    /// Canonical text is pure ASCII and parses back to the same value.
    #[test]
    fn canonical_json_is_ascii_and_faithful(value in json_strategy()) {
        let text = canonical_json(&value);
        prop_assert!(text.is_ascii());
        let parsed: Value = serde_json::from_str(&text).unwrap();
        prop_assert_eq!(fingerprint(&parsed), fingerprint(&value));
    }

    /// A deep clone fingerprints like its source and is independent of it.
    #[test]
    fn deep_clone_is_independent(fields in fields_strategy()) {
        let record = Record::from_value(object_from(&fields)).unwrap();
        let mut copy = record.deep_clone();
        prop_assert_eq!(copy.fingerprint(), record.fingerprint());

        copy.insert("__marker__", Value::Bool(true));
        prop_assert!(record.get("__marker__").is_none());
        prop_assert_ne!(copy.fingerprint(), record.fingerprint());
    }
}
