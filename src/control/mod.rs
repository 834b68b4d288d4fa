//! Control plane module - connection options and the handshake line.
//!
//! Before any frame is exchanged the client sends its [`Options`] as a single
//! JSON object terminated by `\n`. The handshake is codec independent; the
//! codec it names only applies to the frames that follow.
//!
//! # Workflow
//!
//! 1. Client dials and writes the options line
//! 2. Server reads at most 4 KiB up to `\n`
//! 3. Server validates the magic number and resolves the codec type
//! 4. Framed request/response traffic begins
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use wirerpc::control::Options;
//! use wirerpc::codec::JSON_TYPE;
//!
//! let opts = Options::default()
//!     .with_codec_type(JSON_TYPE)
//!     .with_handle_timeout(Duration::from_secs(1));
//! assert_eq!(opts.codec_type, JSON_TYPE);
//! ```

mod handshake;
mod options;

pub use handshake::{accept_options, read_options, write_options, MAX_HANDSHAKE_LEN};
pub use options::{Options, DEFAULT_CONNECT_TIMEOUT};
