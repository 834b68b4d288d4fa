//! Error types for wirerpc.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Main error type for all wirerpc operations.
///
/// The type is `Clone` so that a single terminal connection error can be
/// delivered to every call still pending on a client.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    /// A header or body could not be serialized.
    #[error("encode error: {0}")]
    Encode(String),

    /// A header or body could not be deserialized.
    #[error("decode error: {0}")]
    Decode(String),

    /// Framing or handshake violation (oversized frame, bad option line, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The handshake carried a foreign magic number.
    #[error("invalid magic number {0:#x}")]
    InvalidMagicNumber(u32),

    /// The handshake (or dial options) named a codec nobody registered.
    #[error("invalid codec type {0}")]
    InvalidCodecType(String),

    /// Service registration failed.
    #[error("rpc server: {0}")]
    Register(String),

    /// A request named a service or method that cannot be resolved.
    #[error("{0}")]
    Resolve(String),

    /// Error text reported by the remote side in a response header.
    #[error("{0}")]
    Remote(String),

    /// Peer closed the connection.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The client is closing or its connection is gone.
    #[error("connection is shut down")]
    Shutdown,

    /// A blocking call gave up before its response arrived.
    #[error("rpc client: call failed: {0}")]
    Canceled(String),

    /// Dialing did not finish within the connect timeout.
    #[error("rpc client: connect timeout: expect within {0:?}")]
    ConnectTimeout(Duration),
}

impl RpcError {
    /// Whether the error leaves the byte stream unusable.
    ///
    /// Everything else can be answered in band and the connection keeps going.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            RpcError::Io(_) | RpcError::Protocol(_) | RpcError::ConnectionClosed | RpcError::Shutdown
        )
    }
}

impl From<std::io::Error> for RpcError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            return RpcError::ConnectionClosed;
        }
        RpcError::Io(Arc::new(err))
    }
}

impl From<rmp_serde::encode::Error> for RpcError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        RpcError::Encode(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for RpcError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        RpcError::Decode(err.to_string())
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            return RpcError::Io(Arc::new(err.into()));
        }
        if err.is_data() || err.is_syntax() || err.is_eof() {
            return RpcError::Decode(err.to_string());
        }
        RpcError::Encode(err.to_string())
    }
}

/// Result type alias using RpcError.
pub type Result<T> = std::result::Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unexpected_eof_maps_to_connection_closed() {
        let err: RpcError = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof").into();
        assert!(matches!(err, RpcError::ConnectionClosed));
        assert!(err.is_connection_fatal());
    }

    #[test]
    fn test_request_level_errors_are_not_fatal() {
        assert!(!RpcError::Decode("bad".into()).is_connection_fatal());
        assert!(!RpcError::Resolve("rpc server: can't find service Ghost".into()).is_connection_fatal());
        assert!(!RpcError::Remote("boom".into()).is_connection_fatal());
    }

    #[test]
    fn test_clone_keeps_io_message() {
        let err: RpcError = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe gone").into();
        let cloned = err.clone();
        assert_eq!(err.to_string(), cloned.to_string());
        assert!(cloned.to_string().contains("pipe gone"));
    }

    #[test]
    fn test_remote_error_is_verbatim() {
        assert_eq!(RpcError::Remote("divide by zero".into()).to_string(), "divide by zero");
    }
}
