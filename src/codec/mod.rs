//! Codec module - header/body serialization over a framed byte stream.
//!
//! This module provides:
//!
//! - [`MsgPackCodec`] - MessagePack using `rmp-serde` (`to_vec_named`), the default
//! - [`JsonCodec`] - JSON using `serde_json`
//! - [`Codec`] - a connection's framed reader and serialized writer
//!
//! # Design
//!
//! Format codecs are marker structs with static methods. [`Format`] selects
//! one at runtime from the negotiated codec type token, and
//! [`new_codec_func`] is the registry mapping tokens to constructors.
//!
//! # Example
//!
//! ```
//! use wirerpc::codec::{new_codec_func, Format, MSGPACK_TYPE};
//!
//! assert!(new_codec_func(MSGPACK_TYPE).is_some());
//! assert!(new_codec_func("application/gob").is_none());
//!
//! let encoded = Format::Json.encode(&[1, 2, 3]).unwrap();
//! let decoded: Vec<i32> = Format::Json.decode(&encoded).unwrap();
//! assert_eq!(decoded, vec![1, 2, 3]);
//! ```

mod json;
mod msgpack;
mod stream;

pub use json::JsonCodec;
pub use msgpack::MsgPackCodec;
pub use stream::{Codec, CodecReader, CodecWriter};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;
use crate::transport::{BoxedReader, BoxedWriter};

/// Codec type token for MessagePack.
pub const MSGPACK_TYPE: &str = "application/msgpack";

/// Codec type token for JSON.
pub const JSON_TYPE: &str = "application/json";

/// Serialization format of headers and bodies on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// `application/msgpack`
    MsgPack,
    /// `application/json`
    Json,
}

impl Format {
    /// Resolve a codec type token.
    pub fn from_type(codec_type: &str) -> Option<Self> {
        match codec_type {
            MSGPACK_TYPE => Some(Format::MsgPack),
            JSON_TYPE => Some(Format::Json),
            _ => None,
        }
    }

    /// The codec type token for this format.
    pub fn codec_type(self) -> &'static str {
        match self {
            Format::MsgPack => MSGPACK_TYPE,
            Format::Json => JSON_TYPE,
        }
    }

    /// Encode a value.
    #[inline]
    pub fn encode<T: Serialize + ?Sized>(self, value: &T) -> Result<Vec<u8>> {
        match self {
            Format::MsgPack => MsgPackCodec::encode(value),
            Format::Json => JsonCodec::encode(value),
        }
    }

    /// Decode a value.
    #[inline]
    pub fn decode<T: DeserializeOwned>(self, bytes: &[u8]) -> Result<T> {
        match self {
            Format::MsgPack => MsgPackCodec::decode(bytes),
            Format::Json => JsonCodec::decode(bytes),
        }
    }
}

/// Constructor of a codec over a connection's halves.
pub type NewCodecFn = fn(BoxedReader, BoxedWriter) -> Codec;

/// Look up the codec constructor registered for `codec_type`.
pub fn new_codec_func(codec_type: &str) -> Option<NewCodecFn> {
    match Format::from_type(codec_type)? {
        Format::MsgPack => Some(new_msgpack_codec),
        Format::Json => Some(new_json_codec),
    }
}

fn new_msgpack_codec(reader: BoxedReader, writer: BoxedWriter) -> Codec {
    Codec::new(reader, writer, Format::MsgPack)
}

fn new_json_codec(reader: BoxedReader, writer: BoxedWriter) -> Codec {
    Codec::new(reader, writer, Format::Json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_tokens() {
        for format in [Format::MsgPack, Format::Json] {
            assert_eq!(Format::from_type(format.codec_type()), Some(format));
        }
        assert_eq!(Format::from_type(""), None);
    }

    #[test]
    fn test_registry_lookup() {
        assert!(new_codec_func(MSGPACK_TYPE).is_some());
        assert!(new_codec_func(JSON_TYPE).is_some());
        assert!(new_codec_func("application/x-unknown").is_none());
    }

    #[test]
    fn test_constructed_codec_format() {
        let (a, _b) = tokio::io::duplex(64);
        let (reader, writer) = crate::transport::split_boxed(a);
        let codec = new_codec_func(JSON_TYPE).unwrap()(reader, writer);
        assert_eq!(codec.format(), Format::Json);
    }
}
