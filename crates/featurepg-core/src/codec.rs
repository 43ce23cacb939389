//! Binary encoding of entity keys and feature values
//!
//! Entity keys become the storage key of every row, so their encoding must be
//! deterministic: pairs are sorted by join key name before encoding, which
//! makes `{a: 1, b: 2}` and `{b: 2, a: 1}` produce the same bytes.
//!
//! ## Entity key layout (all integers little-endian `u32`)
//!
//! ```text
//! count
//! count × [ STRING tag | name length | name bytes ]
//! count × [ value tag  | payload length | payload  ]
//! ```
//!
//! Only string, bytes, int32 and int64 values may appear in a key.
//!
//! Feature values are encoded as JSON of the tagged [`Value`] enum. JSON has
//! no NaN or infinity, so non-finite floats are rejected at encode time.

use crate::{EntityKey, Error, Result, Value};

/// Type tags written in front of every encoded entity-key component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ValueType {
    Bytes = 1,
    String = 2,
    Int32 = 3,
    Int64 = 4,
}

impl ValueType {
    fn from_tag(tag: u32) -> Result<Self> {
        match tag {
            1 => Ok(Self::Bytes),
            2 => Ok(Self::String),
            3 => Ok(Self::Int32),
            4 => Ok(Self::Int64),
            other => Err(Error::serialization(format!(
                "unknown entity key value tag {}",
                other
            ))),
        }
    }
}

/// Encodes an entity key to its storage form
pub fn serialize_entity_key(key: &EntityKey) -> Result<Vec<u8>> {
    if key.join_keys.len() != key.entity_values.len() {
        return Err(Error::serialization(format!(
            "entity key has {} join keys but {} values",
            key.join_keys.len(),
            key.entity_values.len()
        )));
    }

    let mut pairs: Vec<(&str, &Value)> = key.pairs().collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));

    let mut out = Vec::with_capacity(4 + pairs.len() * 32);
    put_u32(&mut out, len_u32(pairs.len())?);

    for (name, _) in &pairs {
        put_u32(&mut out, ValueType::String as u32);
        put_chunk(&mut out, name.as_bytes())?;
    }

    for (name, value) in &pairs {
        match value {
            Value::String(s) => {
                put_u32(&mut out, ValueType::String as u32);
                put_chunk(&mut out, s.as_bytes())?;
            }
            Value::Bytes(b) => {
                put_u32(&mut out, ValueType::Bytes as u32);
                put_chunk(&mut out, b)?;
            }
            Value::Int32(i) => {
                put_u32(&mut out, ValueType::Int32 as u32);
                put_chunk(&mut out, &i.to_le_bytes())?;
            }
            Value::Int64(i) => {
                put_u32(&mut out, ValueType::Int64 as u32);
                put_chunk(&mut out, &i.to_le_bytes())?;
            }
            other => {
                return Err(Error::serialization(format!(
                    "join key '{}' has unsupported value type {:?}",
                    name, other
                )))
            }
        }
    }

    Ok(out)
}

/// Decodes bytes produced by [`serialize_entity_key`]
///
/// Pairs come back sorted by join key name.
pub fn deserialize_entity_key(bytes: &[u8]) -> Result<EntityKey> {
    let mut reader = Reader::new(bytes);
    let count = reader.u32()? as usize;

    let mut join_keys = Vec::with_capacity(count.min(64));
    for _ in 0..count {
        let tag = reader.u32()?;
        if ValueType::from_tag(tag)? != ValueType::String {
            return Err(Error::serialization(format!(
                "join key name has tag {} instead of STRING",
                tag
            )));
        }
        let name = std::str::from_utf8(reader.chunk()?)
            .map_err(|e| Error::serialization(format!("join key name is not UTF-8: {}", e)))?;
        join_keys.push(name.to_string());
    }

    let mut entity_values = Vec::with_capacity(join_keys.len());
    for _ in 0..count {
        let tag = ValueType::from_tag(reader.u32()?)?;
        let payload = reader.chunk()?;
        let value = match tag {
            ValueType::String => Value::String(
                String::from_utf8(payload.to_vec())
                    .map_err(|e| Error::serialization(format!("string value is not UTF-8: {}", e)))?,
            ),
            ValueType::Bytes => Value::Bytes(payload.to_vec()),
            ValueType::Int32 => Value::Int32(i32::from_le_bytes(fixed(payload)?)),
            ValueType::Int64 => Value::Int64(i64::from_le_bytes(fixed(payload)?)),
        };
        entity_values.push(value);
    }

    if !reader.is_empty() {
        return Err(Error::serialization(format!(
            "{} trailing bytes after entity key",
            reader.remaining()
        )));
    }

    Ok(EntityKey {
        join_keys,
        entity_values,
    })
}

/// Encodes a feature value for storage
pub fn serialize_value(value: &Value) -> Result<Vec<u8>> {
    ensure_finite(value)?;
    Ok(serde_json::to_vec(value)?)
}

fn ensure_finite(value: &Value) -> Result<()> {
    let finite = match value {
        Value::Double(v) => v.is_finite(),
        Value::Float(v) => v.is_finite(),
        Value::DoubleList(vs) => vs.iter().all(|v| v.is_finite()),
        Value::FloatList(vs) => vs.iter().all(|v| v.is_finite()),
        _ => true,
    };
    if finite {
        Ok(())
    } else {
        Err(Error::serialization(format!(
            "cannot encode non-finite float in {:?}",
            value
        )))
    }
}

/// Decodes a stored feature value
pub fn deserialize_value(bytes: &[u8]) -> Result<Value> {
    Ok(serde_json::from_slice(bytes)?)
}

fn len_u32(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::serialization(format!("length {} exceeds u32", len)))
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_chunk(out: &mut Vec<u8>, bytes: &[u8]) -> Result<()> {
    put_u32(out, len_u32(bytes.len())?);
    out.extend_from_slice(bytes);
    Ok(())
}

fn fixed<const N: usize>(payload: &[u8]) -> Result<[u8; N]> {
    payload.try_into().map_err(|_| {
        Error::serialization(format!(
            "expected {} byte integer, got {} bytes",
            N,
            payload.len()
        ))
    })
}

struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.buf.len() < n {
            return Err(Error::serialization(format!(
                "entity key truncated: need {} bytes, have {}",
                n,
                self.buf.len()
            )));
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(fixed(self.take(4)?)?))
    }

    fn chunk(&mut self) -> Result<&'a [u8]> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    fn remaining(&self) -> usize {
        self.buf.len()
    }

    fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_encoding_is_order_independent() {
        let a = EntityKey::new("user_id", 5_i64).with("merchant_id", "m-9");
        let b = EntityKey::new("merchant_id", "m-9").with("user_id", 5_i64);

        assert_eq!(
            serialize_entity_key(&a).unwrap(),
            serialize_entity_key(&b).unwrap()
        );
    }

    #[test]
    fn test_key_encoding_layout() {
        let bytes = serialize_entity_key(&EntityKey::new("id", 1_i32)).unwrap();

        let mut expected = Vec::new();
        expected.extend_from_slice(&1u32.to_le_bytes()); // count
        expected.extend_from_slice(&2u32.to_le_bytes()); // STRING
        expected.extend_from_slice(&2u32.to_le_bytes());
        expected.extend_from_slice(b"id");
        expected.extend_from_slice(&3u32.to_le_bytes()); // INT32
        expected.extend_from_slice(&4u32.to_le_bytes());
        expected.extend_from_slice(&1i32.to_le_bytes());

        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_distinct_types_encode_differently() {
        let as_i32 = serialize_entity_key(&EntityKey::new("id", 1_i32)).unwrap();
        let as_i64 = serialize_entity_key(&EntityKey::new("id", 1_i64)).unwrap();
        let as_str = serialize_entity_key(&EntityKey::new("id", "1")).unwrap();

        assert_ne!(as_i32, as_i64);
        assert_ne!(as_i64, as_str);
    }

    #[test]
    fn test_decode_returns_sorted_pairs() {
        let key = EntityKey::new("z", vec![0xde_u8, 0xad]).with("a", -3_i64);
        let decoded = deserialize_entity_key(&serialize_entity_key(&key).unwrap()).unwrap();

        assert_eq!(decoded.join_keys, vec!["a", "z"]);
        assert_eq!(decoded.get("a"), Some(&Value::Int64(-3)));
        assert_eq!(decoded.get("z"), Some(&Value::Bytes(vec![0xde, 0xad])));
    }

    #[test]
    fn test_unsupported_key_value_type() {
        let err = serialize_entity_key(&EntityKey::new("score", 0.5_f64)).unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_mismatched_key_lengths() {
        let key = EntityKey {
            join_keys: vec!["a".into(), "b".into()],
            entity_values: vec![Value::Int64(1)],
        };
        assert!(matches!(
            serialize_entity_key(&key),
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn test_truncated_key_is_rejected() {
        let bytes = serialize_entity_key(&EntityKey::new("driver_id", 1001_i64)).unwrap();
        let err = deserialize_entity_key(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn test_trailing_bytes_are_rejected() {
        let mut bytes = serialize_entity_key(&EntityKey::new("driver_id", 1001_i64)).unwrap();
        bytes.push(0);
        assert!(deserialize_entity_key(&bytes).is_err());
    }

    #[test]
    fn test_value_keeps_its_type() {
        for value in [
            Value::Int32(1),
            Value::Int64(1),
            Value::Double(1.0),
            Value::Null,
            Value::StringList(vec!["a".into(), "b".into()]),
        ] {
            let bytes = serialize_value(&value).unwrap();
            assert_eq!(deserialize_value(&bytes).unwrap(), value);
        }
    }

    #[test]
    fn test_non_finite_floats_are_rejected() {
        for value in [
            Value::Double(f64::NAN),
            Value::Double(f64::INFINITY),
            Value::Float(f32::NEG_INFINITY),
            Value::DoubleList(vec![1.0, f64::NAN]),
            Value::FloatList(vec![1.0, f32::INFINITY]),
        ] {
            let err = serialize_value(&value).unwrap_err();
            assert!(matches!(err, Error::Serialization(_)), "{:?}", value);
        }

        let finite = Value::DoubleList(vec![1.5, -0.0, 1e10]);
        let bytes = serialize_value(&finite).unwrap();
        assert_eq!(deserialize_value(&bytes).unwrap(), finite);
    }

    #[test]
    fn test_malformed_value_bytes() {
        let err = deserialize_value(&[0xff, 0x00, 0x13]).unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
