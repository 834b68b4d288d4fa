//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the frame layer that follows the handshake:
//! - 8-byte prefix encoding/decoding
//! - Frame buffer for accumulating partial reads
//! - The `Header` envelope shared by requests and responses

mod frame;
mod frame_buffer;
mod wire_format;

pub use frame::{build_frame, build_frame_parts, Frame};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{Header, Prefix, DEFAULT_MAX_PAYLOAD_SIZE, MAGIC_NUMBER, PREFIX_SIZE};
