//! Record codecs.
//!
//! A table never inspects its record type. It relies on a [`RecordCodec`]
//! supplied at construction to turn values into backend payloads and back.
//! Record types are expected to flatten into the backend's wire format:
//! plain fields, no nested generic containers.

use crate::error::{TableError, TableResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;

/// Converts records to and from raw backend payloads.
pub trait RecordCodec<T>: Send + Sync {
    /// Encodes a record into a payload.
    fn encode(&self, value: &T) -> TableResult<Vec<u8>>;

    /// Decodes a payload received from the backend.
    fn decode(&self, raw: &[u8]) -> TableResult<T>;
}

/// JSON codec backed by `serde_json`.
pub struct JsonCodec<T> {
    flat: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    /// Creates a codec that accepts any JSON shape.
    pub fn new() -> Self {
        Self {
            flat: false,
            _marker: PhantomData,
        }
    }

    /// Creates a codec that rejects records with nested objects or arrays.
    pub fn flat() -> Self {
        Self {
            flat: true,
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonCodec").field("flat", &self.flat).finish()
    }
}

fn check_flat(value: &serde_json::Value) -> TableResult<()> {
    let nested = match value {
        serde_json::Value::Object(fields) => fields
            .iter()
            .find(|(_, v)| v.is_object() || v.is_array())
            .map(|(name, _)| name.clone()),
        serde_json::Value::Array(_) => Some("<root>".to_string()),
        _ => None,
    };
    match nested {
        Some(field) => Err(TableError::Codec(format!(
            "field '{field}' is nested; records must be flat"
        ))),
        None => Ok(()),
    }
}

impl<T> RecordCodec<T> for JsonCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T) -> TableResult<Vec<u8>> {
        let json = serde_json::to_value(value).map_err(|e| TableError::Codec(e.to_string()))?;
        if self.flat {
            check_flat(&json)?;
        }
        serde_json::to_vec(&json).map_err(|e| TableError::Codec(e.to_string()))
    }

    fn decode(&self, raw: &[u8]) -> TableResult<T> {
        serde_json::from_slice(raw).map_err(|e| TableError::Codec(e.to_string()))
    }
}

/// CBOR codec backed by `ciborium`.
pub struct CborCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> CborCodec<T> {
    /// Creates a new CBOR codec.
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for CborCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for CborCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CborCodec")
    }
}

impl<T> RecordCodec<T> for CborCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T) -> TableResult<Vec<u8>> {
        let mut out = Vec::new();
        ciborium::into_writer(value, &mut out).map_err(|e| TableError::Codec(e.to_string()))?;
        Ok(out)
    }

    fn decode(&self, raw: &[u8]) -> TableResult<T> {
        ciborium::from_reader(raw).map_err(|e| TableError::Codec(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Score {
        name: String,
        score: i64,
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Nested {
        name: String,
        tags: Vec<String>,
    }

    #[test]
    fn json_codec_handles_records() {
        let codec = JsonCodec::<Score>::new();
        let raw = br#"{"name":"ada","score":4200}"#;
        let score = codec.decode(raw).unwrap();
        assert_eq!(score.score, 4200);

        let encoded = codec.encode(&score).unwrap();
        assert!(String::from_utf8(encoded).unwrap().contains("\"ada\""));
    }

    #[test]
    fn json_codec_rejects_garbage() {
        let codec = JsonCodec::<Score>::new();
        assert!(matches!(codec.decode(b"{not json"), Err(TableError::Codec(_))));
        assert!(codec.decode(br#"{"name":"x"}"#).is_err());
    }

    #[test]
    fn flat_json_codec_rejects_nesting() {
        let value = Nested {
            name: "x".into(),
            tags: vec!["a".into()],
        };
        assert!(JsonCodec::<Nested>::new().encode(&value).is_ok());

        let err = JsonCodec::<Nested>::flat().encode(&value).unwrap_err();
        assert!(err.to_string().contains("tags"));
    }

    #[test]
    fn cbor_codec_handles_records() {
        let codec = CborCodec::<Score>::new();
        let score = Score {
            name: "grace".into(),
            score: 17,
        };
        let raw = codec.encode(&score).unwrap();
        assert_eq!(codec.decode(&raw).unwrap(), score);
        assert!(codec.decode(&[0xff, 0x00]).is_err());
    }
}
