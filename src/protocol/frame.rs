//! Raw frame: still-encoded header and body segments.
//!
//! Uses `bytes::Bytes` so segments split out of the read buffer are shared,
//! not copied.
//!
//! # Example
//!
//! ```
//! use wirerpc::protocol::{build_frame, FrameBuffer};
//!
//! let bytes = build_frame(b"hdr", b"body");
//! let mut buffer = FrameBuffer::new();
//! let frames = buffer.push(&bytes).unwrap();
//!
//! assert_eq!(frames[0].header(), b"hdr");
//! assert_eq!(frames[0].body(), b"body");
//! ```

use bytes::Bytes;

use super::wire_format::{Prefix, PREFIX_SIZE};

/// A complete frame whose segments have not been decoded yet.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Encoded header segment.
    pub header: Bytes,
    /// Encoded body segment.
    pub body: Bytes,
}

impl Frame {
    /// Create a new frame from its segments.
    pub fn new(header: Bytes, body: Bytes) -> Self {
        Self { header, body }
    }

    /// Encoded header bytes.
    #[inline]
    pub fn header(&self) -> &[u8] {
        &self.header
    }

    /// Encoded body bytes.
    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

}

/// Build a complete frame as a single byte vector.
///
/// Use `build_frame_parts` for scatter/gather I/O (writev).
pub fn build_frame(header: &[u8], body: &[u8]) -> Vec<u8> {
    let prefix = Prefix::new(header.len() as u32, body.len() as u32);
    let mut buf = Vec::with_capacity(prefix.frame_len());
    buf.extend_from_slice(&prefix.encode());
    buf.extend_from_slice(header);
    buf.extend_from_slice(body);
    buf
}

/// Build frame parts for scatter/gather I/O.
///
/// Returns the encoded prefix; the segments are written as they are. Callers
/// check segment sizes first, see [`Prefix::validate`].
pub fn build_frame_parts(header: &[u8], body: &[u8]) -> [u8; PREFIX_SIZE] {
    Prefix::new(header.len() as u32, body.len() as u32).encode()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_accessors() {
        let frame = Frame::new(Bytes::from_static(b"head"), Bytes::from_static(b"payload"));
        assert_eq!(frame.header(), b"head");
        assert_eq!(frame.body(), b"payload");
    }

    #[test]
    fn test_build_frame_layout() {
        let bytes = build_frame(b"ab", b"cde");
        assert_eq!(bytes.len(), PREFIX_SIZE + 5);
        assert_eq!(Prefix::decode(&bytes).unwrap(), Prefix::new(2, 3));
        assert_eq!(&bytes[PREFIX_SIZE..], b"abcde");
    }

    #[test]
    fn test_build_frame_parts_matches_build_frame() {
        let prefix = build_frame_parts(b"ab", b"cde");
        assert_eq!(&build_frame(b"ab", b"cde")[..PREFIX_SIZE], &prefix);
    }
}
