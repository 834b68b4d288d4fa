//! Socket addresses and dialing.
//!
//! - `tcp@host:port`: TCP stream
//! - `unix@/path/to.sock`: Unix Domain Socket (unix only)
//!
//! # Example
//!
//! ```
//! use wirerpc::transport::Address;
//!
//! let addr: Address = "tcp@127.0.0.1:9999".parse().unwrap();
//! assert_eq!(addr, Address::Tcp("127.0.0.1:9999".to_string()));
//! ```

use std::str::FromStr;

use tokio::net::TcpStream;

use super::{BoxedReader, BoxedWriter};
use crate::error::{Result, RpcError};

/// A dialable address in `protocol@addr` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// `host:port` reached over TCP.
    Tcp(String),
    /// Filesystem path of a Unix Domain Socket.
    #[cfg(unix)]
    Unix(std::path::PathBuf),
}

impl FromStr for Address {
    type Err = RpcError;

    fn from_str(s: &str) -> Result<Self> {
        let Some((protocol, addr)) = s.split_once('@') else {
            return Err(RpcError::Protocol(format!(
                "rpc client: wrong format '{}', expect protocol@addr",
                s
            )));
        };

        match protocol {
            "tcp" => Ok(Address::Tcp(addr.to_string())),
            #[cfg(unix)]
            "unix" => Ok(Address::Unix(addr.into())),
            other => Err(RpcError::Protocol(format!(
                "rpc client: unsupported protocol {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Address::Tcp(addr) => write!(f, "tcp@{}", addr),
            #[cfg(unix)]
            Address::Unix(path) => write!(f, "unix@{}", path.display()),
        }
    }
}

/// Connect to `address` and return its split halves.
pub async fn connect(address: &Address) -> Result<(BoxedReader, BoxedWriter)> {
    match address {
        Address::Tcp(addr) => {
            let stream = TcpStream::connect(addr.as_str()).await?;
            stream.set_nodelay(true)?;
            let (reader, writer) = stream.into_split();
            Ok((Box::new(reader), Box::new(writer)))
        }
        #[cfg(unix)]
        Address::Unix(path) => {
            let stream = tokio::net::UnixStream::connect(path).await?;
            let (reader, writer) = stream.into_split();
            Ok((Box::new(reader), Box::new(writer)))
        }
    }
}
