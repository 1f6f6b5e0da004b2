// SPDX-License-Identifier: MIT OR Apache-2.0
//! Canonical fingerprints for option sets.
//!
//! Two option maps with identical key/value content must yield the same
//! representation key no matter how they were assembled. Entries are
//! serialized as a compact JSON array of `[key, value]` pairs in byte-lex
//! key order, then base64url-encoded without padding. The result is short,
//! URL-safe and decodable by hand when inspecting a cache on disk.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Representation key of the empty option set.
///
/// The encoding of zero entries (`[]`) is a fixed constant so identifiers
/// stay compatible across runs and releases.
pub const EMPTY_KEY: &str = "W10";

/// A scalar option value.
///
/// Option sets are flat string-to-scalar maps; nested values are not
/// representable on purpose.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    /// Boolean flag.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating-point value.
    Float(f64),
    /// String value.
    Str(String),
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for OptionValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

/// A flat option set. The `BTreeMap` fixes byte-lex key order.
pub type OptionMap = BTreeMap<String, OptionValue>;

/// Compute the representation key for an option set.
///
/// `None` and the empty map are equivalent and both yield [`EMPTY_KEY`].
/// The fingerprint is deterministic and independent of how the map was
/// built; it is injective up to canonical equality of the entries.
pub fn fingerprint(options: Option<&OptionMap>) -> String {
    let entries: Vec<(&String, &OptionValue)> = options
        .map(|map| map.iter().collect())
        .unwrap_or_default();
    let canonical =
        serde_json::to_vec(&entries).expect("option scalars always serialize to JSON");
    URL_SAFE_NO_PAD.encode(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, &str)]) -> OptionMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), OptionValue::from(*v)))
            .collect()
    }

    #[test]
    fn empty_options_have_fixed_key() {
        assert_eq!(fingerprint(None), EMPTY_KEY);
        assert_eq!(fingerprint(Some(&OptionMap::new())), EMPTY_KEY);
    }

    #[test]
    fn insertion_order_is_irrelevant() {
        let ab = map(&[("b", "0"), ("a", "1")]);
        let ba = map(&[("a", "1"), ("b", "0")]);
        assert_eq!(fingerprint(Some(&ab)), fingerprint(Some(&ba)));
        assert_ne!(fingerprint(Some(&ab)), EMPTY_KEY);
    }

    #[test]
    fn different_content_differs() {
        let one = map(&[("a", "1")]);
        let two = map(&[("a", "2")]);
        assert_ne!(fingerprint(Some(&one)), fingerprint(Some(&two)));
    }

    #[test]
    fn value_types_are_distinguished() {
        let mut as_str = OptionMap::new();
        as_str.insert("flag".into(), OptionValue::from("true"));
        let mut as_bool = OptionMap::new();
        as_bool.insert("flag".into(), OptionValue::from(true));
        assert_ne!(fingerprint(Some(&as_str)), fingerprint(Some(&as_bool)));
    }

    #[test]
    fn keys_are_url_safe() {
        let opts = map(&[("out?fmt", "pdf/a"), ("x", "~!@#")]);
        let key = fingerprint(Some(&opts));
        assert!(
            key.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }
}
