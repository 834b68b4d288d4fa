//! MsgPack codec using `rmp-serde`.
//!
//! **CRITICAL**: Always use `to_vec_named`, NEVER `to_vec`!
//!
//! `to_vec` writes structs as positional arrays. Peers decode `Header` and
//! argument structs by field name (`ServiceMethod`, `Seq`, `Error`), so
//! structs must go out as maps.
//!
//! # Example
//!
//! ```
//! use wirerpc::codec::MsgPackCodec;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Args {
//!     a: i64,
//!     b: i64,
//! }
//!
//! let args = Args { a: 1, b: 2 };
//! let encoded = MsgPackCodec::encode(&args).unwrap();
//! let decoded: Args = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, args);
//! ```

use crate::error::Result;

/// MessagePack codec for structured data.
///
/// Token: `application/msgpack`. The default codec.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes (struct-as-map).
    #[inline]
    pub fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        // CRITICAL: to_vec_named, NOT to_vec!
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes cannot be deserialized to type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Header;
    use serde::{Deserialize, Serialize};
    use std::collections::BTreeMap;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Args {
        num1: i64,
        num2: i64,
    }

    #[test]
    fn test_header_roundtrip() {
        let mut header = Header::new("Arith.Sum", 42);
        header.error = "divide by zero".into();

        let encoded = MsgPackCodec::encode(&header).unwrap();
        let decoded: Header = MsgPackCodec::decode(&encoded).unwrap();

        assert_eq!(decoded, header);
    }

    #[test]
    fn test_header_uses_named_fields() {
        let encoded = MsgPackCodec::encode(&Header::new("Foo.Bar", 1)).unwrap();

        // fixmap with 3 entries, not fixarray
        assert_eq!(encoded[0], 0x83, "Expected fixmap, got {:02X}", encoded[0]);
        let text = String::from_utf8_lossy(&encoded);
        assert!(text.contains("ServiceMethod"));
        assert!(text.contains("Seq"));
    }

    #[test]
    fn test_header_missing_error_field_defaults() {
        #[derive(Serialize)]
        #[serde(rename_all = "PascalCase")]
        struct Legacy<'a> {
            service_method: &'a str,
            seq: u64,
        }

        let encoded = MsgPackCodec::encode(&Legacy { service_method: "A.B", seq: 9 }).unwrap();
        let decoded: Header = MsgPackCodec::decode(&encoded).unwrap();
        assert_eq!(decoded.seq, 9);
        assert!(decoded.error.is_empty());
    }

    #[test]
    fn test_args_and_replies() {
        let args = Args { num1: -3, num2: 7 };
        let decoded: Args = MsgPackCodec::decode(&MsgPackCodec::encode(&args).unwrap()).unwrap();
        assert_eq!(decoded, args);

        let mut reply = BTreeMap::new();
        reply.insert("sum".to_string(), vec![1i64, 2, 3]);
        let decoded: BTreeMap<String, Vec<i64>> =
            MsgPackCodec::decode(&MsgPackCodec::encode(&reply).unwrap()).unwrap();
        assert_eq!(decoded, reply);
    }

    #[test]
    fn test_unit_placeholder_is_nil() {
        assert_eq!(MsgPackCodec::encode(&()).unwrap(), vec![0xc0]);
    }

    #[test]
    fn test_unsized_str_encodes() {
        let encoded = MsgPackCodec::encode("hello").unwrap();
        let decoded: String = MsgPackCodec::decode(&encoded).unwrap();
        assert_eq!(decoded, "hello");
    }

    #[test]
    fn test_binary_payload() {
        let data: Vec<u8> = vec![0x01, 0x02, 0x03];
        let encoded = MsgPackCodec::encode(&serde_bytes::Bytes::new(&data)).unwrap();
        assert_eq!(encoded[0], 0xc4, "Expected bin8 format");

        let decoded: serde_bytes::ByteBuf = MsgPackCodec::decode(&encoded).unwrap();
        assert_eq!(decoded.as_ref(), &data);
    }

    #[test]
    fn test_decode_error_on_invalid_data() {
        let result: Result<Args> = MsgPackCodec::decode(b"not valid msgpack");
        assert!(matches!(result, Err(crate::RpcError::Decode(_))));
    }
}
