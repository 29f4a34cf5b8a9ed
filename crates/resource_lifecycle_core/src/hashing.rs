use serde_json::{Map, Number, Value};
use sha2::{Digest, Sha256};

/// 2^63: integral floats below this magnitude fit in `i64` exactly.
const INTEGRAL_FLOAT_LIMIT: f64 = 9_223_372_036_854_775_808.0;

const STRING_TAG: u8 = b's';
const NUMBER_TAG: u8 = b'n';
const SEQUENCE_TAG: u8 = b'l';
const MAPPING_TAG: u8 = b'm';

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HashError {
    #[error("Unexpected value type: {kind}")]
    UnsupportedType { kind: &'static str },
}

/// Computes the structural SHA-256 digest of `value` as lowercase hex.
///
/// Every node is framed before it is fed: leaves as a type tag, a big-endian
/// `u64` byte length and the bytes; sequences and mappings as a type tag and
/// a big-endian `u64` entry count followed by their entries. Mapping keys are
/// fed in sorted order as framed strings, each followed by its value, so
/// insertion order never matters while distinct structures never share a
/// byte stream. Numbers use their canonical decimal rendering. Booleans and
/// null are rejected.
pub fn content_hash(value: &Value) -> Result<String, HashError> {
    let mut hasher = Sha256::new();
    feed_value(&mut hasher, value)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Convenience wrapper for hashing a property mapping.
pub fn properties_hash(properties: &Map<String, Value>) -> Result<String, HashError> {
    let mut hasher = Sha256::new();
    feed_mapping(&mut hasher, properties)?;
    Ok(format!("{:x}", hasher.finalize()))
}

fn feed_value(hasher: &mut Sha256, value: &Value) -> Result<(), HashError> {
    match value {
        Value::String(text) => feed_leaf(hasher, STRING_TAG, text.as_bytes()),
        Value::Number(number) => {
            feed_leaf(hasher, NUMBER_TAG, canonical_number(number).as_bytes())
        }
        Value::Array(items) => {
            feed_header(hasher, SEQUENCE_TAG, items.len());
            for item in items {
                feed_value(hasher, item)?;
            }
        }
        Value::Object(entries) => feed_mapping(hasher, entries)?,
        Value::Bool(_) => return Err(HashError::UnsupportedType { kind: "boolean" }),
        Value::Null => return Err(HashError::UnsupportedType { kind: "null" }),
    }
    Ok(())
}

fn feed_mapping(hasher: &mut Sha256, entries: &Map<String, Value>) -> Result<(), HashError> {
    let mut keys: Vec<&String> = entries.keys().collect();
    keys.sort_unstable();
    feed_header(hasher, MAPPING_TAG, keys.len());
    for key in keys {
        feed_leaf(hasher, STRING_TAG, key.as_bytes());
        feed_value(hasher, &entries[key.as_str()])?;
    }
    Ok(())
}

fn feed_header(hasher: &mut Sha256, tag: u8, len: usize) {
    hasher.update([tag]);
    hasher.update((len as u64).to_be_bytes());
}

fn feed_leaf(hasher: &mut Sha256, tag: u8, bytes: &[u8]) {
    feed_header(hasher, tag, bytes.len());
    hasher.update(bytes);
}

/// Renders a number the same way whether it arrived as `1` or `1.0`.
pub fn canonical_number(number: &Number) -> String {
    if let Some(value) = number.as_i64() {
        return value.to_string();
    }
    if let Some(value) = number.as_u64() {
        return value.to_string();
    }
    match number.as_f64() {
        Some(value) if value.fract() == 0.0 && value.abs() < INTEGRAL_FLOAT_LIMIT => {
            (value as i64).to_string()
        }
        Some(value) => value.to_string(),
        None => number.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sha256_hex(input: &[u8]) -> String {
        format!("{:x}", Sha256::digest(input))
    }

    fn framed(tag: u8, len: usize) -> Vec<u8> {
        let mut bytes = vec![tag];
        bytes.extend_from_slice(&(len as u64).to_be_bytes());
        bytes
    }

    fn leaf(tag: u8, text: &str) -> Vec<u8> {
        let mut bytes = framed(tag, text.len());
        bytes.extend_from_slice(text.as_bytes());
        bytes
    }

    #[test]
    fn mapping_hash_ignores_key_order() {
        let first = json!({"key1": "foo", "key2": "bar"});
        let second = json!({"key2": "bar", "key1": "foo"});

        assert_eq!(
            content_hash(&first).expect("hash"),
            content_hash(&second).expect("hash")
        );
    }

    #[test]
    fn sequence_hash_depends_on_elements() {
        assert_ne!(
            content_hash(&json!(["foo"])).expect("hash"),
            content_hash(&json!([])).expect("hash")
        );
        assert_ne!(
            content_hash(&json!(["a", "b"])).expect("hash"),
            content_hash(&json!(["b", "a"])).expect("hash")
        );
    }

    #[test]
    fn nested_mapping_changes_are_detected() {
        let populated = json!({"a": 1, "b": {"c": 1}});
        let emptied = json!({"a": 1, "b": {}});

        assert_ne!(
            content_hash(&populated).expect("hash"),
            content_hash(&emptied).expect("hash")
        );
    }

    #[test]
    fn hashing_is_deterministic() {
        let first = content_hash(&json!("foo")).expect("hash");
        let second = content_hash(&json!("foo")).expect("hash");

        assert_eq!(first, second);
        assert_eq!(first, sha256_hex(&leaf(b's', "foo")));
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn mapping_feeds_sorted_keys_then_values() {
        let hash = content_hash(&json!({"b": "2", "a": ["x", 1]})).expect("hash");

        let mut expected = framed(b'm', 2);
        expected.extend(leaf(b's', "a"));
        expected.extend(framed(b'l', 2));
        expected.extend(leaf(b's', "x"));
        expected.extend(leaf(b'n', "1"));
        expected.extend(leaf(b's', "b"));
        expected.extend(leaf(b's', "2"));
        assert_eq!(hash, sha256_hex(&expected));
    }

    #[test]
    fn shifted_boundaries_and_type_changes_yield_distinct_hashes() {
        let pairs = [
            (json!({"Tags": ["a", "bc"]}), json!({"Tags": ["ab", "c"]})),
            (json!({"ab": "c"}), json!({"a": "bc"})),
            (json!({"Size": 1}), json!({"Size": "1"})),
            (json!({"Name": ["x"]}), json!({"Name": "x"})),
            (json!({"a": {}}), json!({"a": []})),
            (json!([["a"], []]), json!([[], ["a"]])),
        ];

        for (first, second) in pairs {
            assert_ne!(
                content_hash(&first).expect("hash"),
                content_hash(&second).expect("hash"),
                "{first} and {second} must not share an identity"
            );
        }
    }

    #[test]
    fn rejects_booleans_and_null() {
        assert_eq!(
            content_hash(&json!(true)),
            Err(HashError::UnsupportedType { kind: "boolean" })
        );
        assert_eq!(
            content_hash(&json!({"nested": [null]})),
            Err(HashError::UnsupportedType { kind: "null" })
        );
    }

    #[test]
    fn integral_floats_hash_like_integers() {
        assert_eq!(
            content_hash(&json!(1.0)).expect("hash"),
            content_hash(&json!(1)).expect("hash")
        );
        assert_eq!(canonical_number(&Number::from_f64(0.5).expect("finite")), "0.5");
        assert_eq!(canonical_number(&Number::from(-42)), "-42");
        assert_eq!(canonical_number(&Number::from(u64::MAX)), u64::MAX.to_string());
        assert_eq!(
            canonical_number(&Number::from_f64(1e18).expect("finite")),
            "1000000000000000000"
        );
        assert_eq!(
            canonical_number(&Number::from_f64(-9_007_199_254_740_994.0).expect("finite")),
            "-9007199254740994"
        );
        assert_eq!(
            canonical_number(&Number::from_f64(1e19).expect("finite")),
            1e19_f64.to_string()
        );
    }

    #[test]
    fn properties_hash_matches_object_hash() {
        let value = json!({"Name": "a", "Tags": ["x"]});
        let Value::Object(properties) = value.clone() else {
            unreachable!()
        };

        assert_eq!(
            properties_hash(&properties).expect("hash"),
            content_hash(&value).expect("hash")
        );
    }
}
