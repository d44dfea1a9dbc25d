//! JSON record encoding for store values.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::keys::display_key;
use crate::store::KvStore;
use crate::AssetError;

/// Encode a record for storage under `key`.
pub fn encode<T: Serialize>(key: &[u8], value: &T) -> Result<Vec<u8>, AssetError> {
    serde_json::to_vec(value).map_err(|e| AssetError::Codec {
        key: display_key(key),
        details: format!("encode: {e}"),
    })
}

/// Decode a record read from `key`.
pub fn decode<T: DeserializeOwned>(key: &[u8], bytes: &[u8]) -> Result<T, AssetError> {
    serde_json::from_slice(bytes).map_err(|e| AssetError::Codec {
        key: display_key(key),
        details: format!("decode: {e}"),
    })
}

/// Read and decode the record under `key`, if present.
pub fn load<S, T>(kv: &S, key: &[u8]) -> Result<Option<T>, AssetError>
where
    S: KvStore + ?Sized,
    T: DeserializeOwned,
{
    kv.get(key).map(|bytes| decode(key, &bytes)).transpose()
}

/// Encode `value` and write it under `key`.
pub fn store<S, T>(kv: &mut S, key: Vec<u8>, value: &T) -> Result<(), AssetError>
where
    S: KvStore + ?Sized,
    T: Serialize,
{
    let bytes = encode(&key, value)?;
    kv.set(key, bytes);
    Ok(())
}

/// `serde(with)` adapter writing a [`BigUint`](num_bigint::BigUint) as a
/// decimal string. Reads either a decimal string or a JSON integer, so
/// hand-written messages can say `"amount": 5`.
pub mod decimal {
    use std::fmt;

    use num_bigint::BigUint;
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigUint, D::Error> {
        deserializer.deserialize_any(DecimalVisitor)
    }

    struct DecimalVisitor;

    impl<'de> Visitor<'de> for DecimalVisitor {
        type Value = BigUint;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a non-negative decimal integer")
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<BigUint, E> {
            Ok(BigUint::from(value))
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<BigUint, E> {
            if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
                return Err(E::invalid_value(de::Unexpected::Str(value), &self));
            }
            value.parse().map_err(E::custom)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemStore;

    #[test]
    fn store_then_load() {
        let mut kv = MemStore::new();
        store(&mut kv, b"k".to_vec(), &vec![1u32, 2, 3]).unwrap();
        let loaded: Option<Vec<u32>> = load(&kv, b"k").unwrap();
        assert_eq!(loaded, Some(vec![1, 2, 3]));
        let missing: Option<Vec<u32>> = load(&kv, b"absent").unwrap();
        assert_eq!(missing, None);
    }

    #[test]
    fn garbage_bytes_are_a_codec_error() {
        let mut kv = MemStore::new();
        kv.set(b"k".to_vec(), b"not json".to_vec());
        let result: Result<Option<Vec<u32>>, _> = load(&kv, b"k");
        assert!(matches!(result, Err(AssetError::Codec { .. })));
    }

    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Amount(#[serde(with = "decimal")] num_bigint::BigUint);

    #[test]
    fn decimal_accepts_strings_and_integers() {
        let big: Amount = serde_json::from_str("\"340282366920938463463374607431768211456\"").unwrap();
        assert_eq!(
            serde_json::to_string(&big).unwrap(),
            "\"340282366920938463463374607431768211456\""
        );
        let small: Amount = serde_json::from_str("42").unwrap();
        assert_eq!(small, Amount(42u32.into()));
        assert!(serde_json::from_str::<Amount>("-1").is_err());
        assert!(serde_json::from_str::<Amount>("\"1e3\"").is_err());
    }
}
