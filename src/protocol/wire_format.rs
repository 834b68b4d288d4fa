//! Wire format encoding and decoding.
//!
//! After the handshake every frame starts with an 8-byte prefix:
//! ```text
//! ┌────────────┬────────────┬──────────────┬──────────────┐
//! │ Header len │ Body len   │ Header bytes │ Body bytes   │
//! │ uint32 BE  │ uint32 BE  │ (codec)      │ (codec)      │
//! └────────────┴────────────┴──────────────┴──────────────┘
//! ```
//!
//! The header and body segments are encoded by the negotiated codec.
//! All multi-byte integers in the prefix are Big Endian.

use serde::{Deserialize, Serialize};

use crate::error::{Result, RpcError};

/// Protocol identity constant carried by every handshake.
pub const MAGIC_NUMBER: u32 = 0x3bef5c;

/// Prefix size in bytes (fixed, exactly 8).
pub const PREFIX_SIZE: usize = 8;

/// Default maximum size of a single header or body segment (64 MB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 64 * 1024 * 1024;

/// Per-call envelope preceding every body, in both directions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Header {
    /// Target in `"Service.Method"` form.
    pub service_method: String,
    /// Connection-scoped call identifier.
    pub seq: u64,
    /// Empty on success, error text otherwise.
    #[serde(default)]
    pub error: String,
}

impl Header {
    /// Create a request header.
    pub fn new(service_method: impl Into<String>, seq: u64) -> Self {
        Self {
            service_method: service_method.into(),
            seq,
            error: String::new(),
        }
    }

    /// Whether the header reports a failure.
    #[inline]
    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }
}

/// Decoded frame prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prefix {
    /// Length of the encoded header segment.
    pub header_len: u32,
    /// Length of the encoded body segment.
    pub body_len: u32,
}

impl Prefix {
    /// Create a new prefix.
    pub fn new(header_len: u32, body_len: u32) -> Self {
        Self {
            header_len,
            body_len,
        }
    }

    /// Encode prefix to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use wirerpc::protocol::Prefix;
    ///
    /// let bytes = Prefix::new(12, 100).encode();
    /// assert_eq!(bytes.len(), 8);
    /// ```
    pub fn encode(&self) -> [u8; PREFIX_SIZE] {
        let mut buf = [0u8; PREFIX_SIZE];
        buf[0..4].copy_from_slice(&self.header_len.to_be_bytes());
        buf[4..8].copy_from_slice(&self.body_len.to_be_bytes());
        buf
    }

    /// Decode prefix from bytes (Big Endian).
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < PREFIX_SIZE {
            return None;
        }
        Some(Self {
            header_len: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            body_len: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
        })
    }

    /// Reject segments larger than `max_payload_size`.
    ///
    /// An empty header segment is also rejected: every frame carries a header.
    pub fn validate(&self, max_payload_size: u32) -> Result<()> {
        if self.header_len == 0 {
            return Err(RpcError::Protocol("Header segment is empty".to_string()));
        }

        for (name, len) in [("Header", self.header_len), ("Body", self.body_len)] {
            if len > max_payload_size {
                return Err(RpcError::Protocol(format!(
                    "{} size {} exceeds maximum {}",
                    name, len, max_payload_size
                )));
            }
        }

        Ok(())
    }

    /// Total frame length including the prefix.
    #[inline]
    pub fn frame_len(&self) -> usize {
        PREFIX_SIZE + self.header_len as usize + self.body_len as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_big_endian_byte_order() {
        let bytes = Prefix::new(0x01020304, 0x05060708).encode();
        assert_eq!(bytes, [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(Prefix::decode(&bytes).unwrap(), Prefix::new(0x01020304, 0x05060708));
    }

    #[test]
    fn test_decode_too_short_buffer() {
        assert!(Prefix::decode(&[0u8; 7]).is_none());
    }

    #[test]
    fn test_validate_segment_too_large() {
        let err = Prefix::new(10, 1_000).validate(100).unwrap_err();
        assert!(err.to_string().contains("Body size 1000 exceeds maximum 100"));
        assert!(err.is_connection_fatal());
    }

    #[test]
    fn test_validate_empty_header_rejected() {
        assert!(Prefix::new(0, 4).validate(DEFAULT_MAX_PAYLOAD_SIZE).is_err());
        assert!(Prefix::new(1, 0).validate(DEFAULT_MAX_PAYLOAD_SIZE).is_ok());
    }

    #[test]
    fn test_frame_len() {
        assert_eq!(Prefix::new(3, 5).frame_len(), PREFIX_SIZE + 8);
    }

    #[test]
    fn test_header_accessors() {
        let mut header = Header::new("Arith.Sum", 7);
        assert!(!header.is_error());
        header.error = "boom".into();
        assert!(header.is_error());
        assert_eq!(header.service_method, "Arith.Sum");
        assert_eq!(header.seq, 7);
    }
}
