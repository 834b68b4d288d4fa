//! JSON codec using `serde_json`.

use crate::error::{Result, RpcError};

/// JSON codec for structured data.
///
/// Token: `application/json`.
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a value to JSON bytes.
    #[inline]
    pub fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        // serde_json classifies custom serializer errors as data errors.
        serde_json::to_vec(value).map_err(|e| RpcError::Encode(e.to_string()))
    }

    /// Decode JSON bytes to a value.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Header;

    #[test]
    fn test_header_field_names() {
        let encoded = JsonCodec::encode(&Header::new("Arith.Sum", 3)).unwrap();
        assert_eq!(
            String::from_utf8(encoded).unwrap(),
            r#"{"ServiceMethod":"Arith.Sum","Seq":3,"Error":""}"#
        );
    }

    #[test]
    fn test_header_roundtrip() {
        let mut header = Header::new("Foo.Sum", u64::MAX);
        header.error = "boom".into();
        let decoded: Header = JsonCodec::decode(&JsonCodec::encode(&header).unwrap()).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_decode_error_is_decode_variant() {
        let result: Result<Header> = JsonCodec::decode(b"{not json");
        assert!(matches!(result, Err(crate::RpcError::Decode(_))));
    }
}
