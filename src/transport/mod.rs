//! Transport module - byte streams the codec runs over.
//!
//! Provides:
//! - Boxed read/write halves so codecs stay independent of the socket type
//! - `protocol@addr` address parsing and dialing (TCP, Unix Domain Sockets)

mod socket;

pub use socket::{connect, Address};

use tokio::io::{AsyncRead, AsyncWrite};

/// Type-erased read half of a connection.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Type-erased write half of a connection.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Split any duplex stream into boxed halves.
pub fn split_boxed<S>(stream: S) -> (BoxedReader, BoxedWriter)
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    (Box::new(reader), Box::new(writer))
}
