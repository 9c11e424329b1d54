//! MessagePack payload encoding.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::CacheError;
use crate::store::Payload;

/// Encodes with field names so payloads survive field reordering.
pub fn encode<T: Serialize>(value: &T) -> Result<Payload, CacheError> {
    Ok(Arc::new(rmp_serde::to_vec_named(value)?))
}

pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, CacheError> {
    Ok(rmp_serde::from_slice(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Dto {
        id: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    }

    #[test]
    fn test_optional_fields_may_be_omitted() {
        let bytes = encode(&Dto { id: 7, note: None }).unwrap();
        let back: Dto = decode(&bytes).unwrap();
        assert_eq!(back, Dto { id: 7, note: None });
    }

    #[test]
    fn test_garbage_is_a_serialization_error() {
        let err = decode::<Dto>(b"\xc1not msgpack").unwrap_err();
        assert!(matches!(err, CacheError::Serialization { .. }));
    }
}
