//! # wirerpc
//!
//! Request/response RPC over a single point-to-point connection.
//!
//! A client multiplexes many concurrent calls over one stream; a server
//! dispatches each request by `"Service.Method"` name to a registered
//! receiver and answers within an optional time budget.
//!
//! ## Architecture
//!
//! - **Handshake**: one JSON [`Options`] line picks the codec and the handle timeout
//! - **Frames**: 8-byte prefix, then a [`protocol::Header`] and a body in the
//!   negotiated codec (MsgPack by default, JSON optional)
//! - **Server**: one task per connection, one task per request, methods run
//!   on the blocking pool
//! - **Client**: one receive task matching responses to pending calls by seq
//!
//! ## Example
//!
//! ```no_run
//! use wirerpc::service::{MethodSet, Service};
//! use wirerpc::{Client, Options, Server};
//!
//! struct Arith;
//!
//! impl Arith {
//!     fn mul(&self, args: (i64, i64), reply: &mut i64) -> Result<(), String> {
//!         *reply = args.0 * args.1;
//!         Ok(())
//!     }
//! }
//!
//! impl Service for Arith {
//!     fn methods(set: &mut MethodSet<Self>) {
//!         set.add("Mul", Arith::mul);
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::new();
//!     server.register(Arith)?;
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
//!     let addr = listener.local_addr()?;
//!     tokio::spawn(async move { server.accept(listener).await });
//!
//!     let client = Client::xdial(&format!("tcp@{}", addr), Options::default()).await?;
//!     let product: i64 = client.call("Arith.Mul", &(6, 7)).await?;
//!     assert_eq!(product, 42);
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod control;
pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;

mod client;
mod server;
mod writer;

pub use client::{AsyncCall, Call, Client, DEFAULT_SINK_CAPACITY};
pub use control::Options;
pub use error::{Result, RpcError};
pub use server::{Server, ServerBuilder, DEFAULT_MAX_CONCURRENT_REQUESTS};
