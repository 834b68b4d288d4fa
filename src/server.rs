//! RPC server: service registry plus the per-connection request pipeline.
//!
//! # Example
//!
//! ```no_run
//! use wirerpc::service::{MethodSet, Service};
//! use wirerpc::Server;
//!
//! struct Arith;
//!
//! impl Arith {
//!     fn sum(&self, args: (i64, i64), reply: &mut i64) -> Result<(), String> {
//!         *reply = args.0 + args.1;
//!         Ok(())
//!     }
//! }
//!
//! impl Service for Arith {
//!     fn methods(set: &mut MethodSet<Self>) {
//!         set.add("Sum", Arith::sum);
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::new();
//!     server.register(Arith)?;
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:9999").await?;
//!     server.accept(listener).await;
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::codec::{Codec, CodecReader, CodecWriter};
use crate::control::{accept_options, read_options};
use crate::error::{Result, RpcError};
use crate::protocol::{Header, DEFAULT_MAX_PAYLOAD_SIZE};
use crate::service::{Argv, MethodDescriptor, ReplyValue, Service, ServiceDescriptor};

/// Default bound on requests running concurrently per connection.
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 256;

/// Builder for configuring a [`Server`].
#[derive(Debug, Clone)]
pub struct ServerBuilder {
    max_concurrent_requests: usize,
    max_payload_size: u32,
}

impl ServerBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }

    /// Set the maximum number of requests running concurrently per connection.
    ///
    /// When the limit is reached the connection stops reading until a
    /// request finishes. Default: 256.
    pub fn max_concurrent_requests(mut self, limit: usize) -> Self {
        self.max_concurrent_requests = limit.max(1);
        self
    }

    /// Set the largest header or body segment read or written.
    ///
    /// A reply over the limit is answered with an error instead. Default: 64 MiB.
    pub fn max_payload_size(mut self, limit: u32) -> Self {
        self.max_payload_size = limit;
        self
    }

    /// Build the server.
    pub fn build(self) -> Server {
        Server {
            inner: Arc::new(ServerInner {
                services: RwLock::new(HashMap::new()),
                max_concurrent_requests: self.max_concurrent_requests,
                max_payload_size: self.max_payload_size,
            }),
        }
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct ServerInner {
    services: RwLock<HashMap<String, Arc<ServiceDescriptor>>>,
    max_concurrent_requests: usize,
    max_payload_size: u32,
}

/// An RPC server. Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

/// A decoded request waiting for its worker.
struct Request {
    header: Header,
    service: Arc<ServiceDescriptor>,
    method: Arc<MethodDescriptor>,
    argv: Argv,
    replyv: Box<dyn ReplyValue>,
}

enum ReadError {
    /// The stream is unusable.
    Fatal(RpcError),
    /// Answered in band, the connection keeps serving.
    Invalid { header: Header, reason: String },
}

impl Server {
    /// Create a server with default settings.
    pub fn new() -> Self {
        ServerBuilder::new().build()
    }

    /// Create a new server builder.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Register a receiver's eligible methods under its service name.
    ///
    /// # Errors
    ///
    /// Fails if the name is not exported or already registered.
    pub fn register<S: Service>(&self, receiver: S) -> Result<()> {
        let service = ServiceDescriptor::new(receiver)?;
        let name = service.name().to_string();

        let mut services = self.inner.services.write();
        if services.contains_key(&name) {
            return Err(RpcError::Register(format!("service already defined: {}", name)));
        }
        debug!("rpc server: registered service {} {:?}", name, service.method_names());
        services.insert(name, Arc::new(service));
        Ok(())
    }

    /// Look up a registered service.
    pub fn service(&self, name: &str) -> Option<Arc<ServiceDescriptor>> {
        self.inner.services.read().get(name).cloned()
    }

    /// Resolve `"Service.Method"` to its descriptors.
    pub fn find_service(
        &self,
        service_method: &str,
    ) -> Result<(Arc<ServiceDescriptor>, Arc<MethodDescriptor>)> {
        let Some((service_name, method_name)) = service_method.rsplit_once('.') else {
            return Err(RpcError::Resolve(format!(
                "rpc server: service/method request ill-formed: {}",
                service_method
            )));
        };

        let service = self.service(service_name).ok_or_else(|| {
            RpcError::Resolve(format!("rpc server: can't find service {}", service_name))
        })?;
        let method = service.method(method_name).ok_or_else(|| {
            RpcError::Resolve(format!("rpc server: can't find method {}", method_name))
        })?;

        Ok((service, method))
    }

    /// Serve every connection accepted on `listener`, each on its own task.
    ///
    /// Returns when accepting fails.
    pub async fn accept(&self, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    debug!("rpc server: accepted {}", peer);
                    let _ = stream.set_nodelay(true);
                    let server = self.clone();
                    tokio::spawn(async move { server.serve_conn(stream).await });
                }
                Err(e) => {
                    error!("rpc server: accept error: {}", e);
                    return;
                }
            }
        }
    }

    /// Serve every connection accepted on a Unix Domain Socket listener.
    #[cfg(unix)]
    pub async fn accept_unix(&self, listener: tokio::net::UnixListener) {
        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let server = self.clone();
                    tokio::spawn(async move { server.serve_conn(stream).await });
                }
                Err(e) => {
                    error!("rpc server: accept error: {}", e);
                    return;
                }
            }
        }
    }

    /// Serve a single connection until it closes.
    ///
    /// A rejected handshake closes the connection without writing anything.
    pub async fn serve_conn<T>(&self, stream: T)
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let mut reader = BufReader::new(read_half);

        let options = match read_options(&mut reader).await {
            Ok(options) => options,
            Err(e) => {
                warn!("rpc server: options error: {}", e);
                return;
            }
        };
        let new_codec = match accept_options(&options) {
            Ok(new_codec) => new_codec,
            Err(e) => {
                warn!("rpc server: {}", e);
                return;
            }
        };

        // The BufReader may already hold the first frames.
        let codec = new_codec(Box::new(reader), Box::new(write_half))
            .with_max_payload(self.inner.max_payload_size);
        self.serve_codec(codec, options.handle_timeout).await;
    }

    async fn serve_codec(&self, codec: Codec, handle_timeout: Duration) {
        let (mut reader, writer) = codec.into_split();
        let semaphore = Arc::new(Semaphore::new(self.inner.max_concurrent_requests));
        let mut workers = JoinSet::new();

        loop {
            let request = match self.read_request(&mut reader).await {
                Ok(request) => request,
                Err(ReadError::Invalid { mut header, reason }) => {
                    warn!("rpc server: seq {}: {}", header.seq, reason);
                    header.error = reason;
                    if writer.write(&header, &()).await.is_err() {
                        break;
                    }
                    continue;
                }
                Err(ReadError::Fatal(RpcError::ConnectionClosed)) => break,
                Err(ReadError::Fatal(e)) => {
                    warn!("rpc server: read error: {}", e);
                    break;
                }
            };

            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let writer = writer.clone();
            workers.spawn(handle_request(writer, request, handle_timeout, permit));

            while let Some(done) = workers.try_join_next() {
                log_worker_exit(done);
            }
        }

        while let Some(done) = workers.join_next().await {
            log_worker_exit(done);
        }
        let _ = writer.close().await;
    }

    async fn read_request(&self, reader: &mut CodecReader) -> std::result::Result<Request, ReadError> {
        let header = match reader.read_header().await {
            Ok(header) => header,
            Err(e) if e.is_connection_fatal() => return Err(ReadError::Fatal(e)),
            Err(e) => {
                reader.discard_body();
                return Err(ReadError::Invalid {
                    header: Header::default(),
                    reason: format!("rpc server: read header error: {}", e),
                });
            }
        };

        let (service, method) = match self.find_service(&header.service_method) {
            Ok(found) => found,
            Err(e) => {
                reader.discard_body();
                return Err(ReadError::Invalid {
                    header,
                    reason: e.to_string(),
                });
            }
        };

        let body = reader.take_body();
        let argv = match method.decode_argv(reader.format(), &body) {
            Ok(argv) => argv,
            Err(e) => {
                return Err(ReadError::Invalid {
                    header,
                    reason: format!("rpc server: read argv err: {}", e),
                })
            }
        };
        let replyv = method.new_replyv();

        Ok(Request {
            header,
            service,
            method,
            argv,
            replyv,
        })
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

fn log_worker_exit(done: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = done {
        error!("rpc server: request worker failed: {}", e);
    }
}

/// Run one request and write its response, bounded by `timeout` when non-zero.
///
/// The invocation signals `called` once it returns and `sent` once its
/// response is written. If the timer fires first, closing `called` makes the
/// invocation drop its result instead of writing it. The invocation holds
/// `permit` until it finishes, even after a timeout was answered.
async fn handle_request(
    writer: CodecWriter,
    request: Request,
    timeout: Duration,
    permit: OwnedSemaphorePermit,
) {
    let Request {
        header,
        service,
        method,
        argv,
        replyv,
    } = request;

    let (called_tx, mut called_rx) = oneshot::channel::<()>();
    let (sent_tx, sent_rx) = oneshot::channel::<()>();
    let timeout_header = header.clone();

    let invocation_writer = writer.clone();
    tokio::spawn(async move {
        let _permit = permit;
        let mut header = header;
        let result = tokio::task::spawn_blocking(move || {
            let mut replyv = replyv;
            let result = service.call(&method, argv, &mut *replyv);
            (replyv, result)
        })
        .await;

        if called_tx.send(()).is_err() {
            debug!(
                "rpc server: discard late result of {} seq {}",
                header.service_method, header.seq
            );
            return;
        }

        let _ = match result {
            Ok((replyv, Ok(()))) => {
                let written = invocation_writer
                    .write_with(&header, move |format| replyv.encode(format))
                    .await;
                match written {
                    // Refused before anything was written; tell the caller.
                    Err(RpcError::Encode(reason)) => {
                        header.error = format!("rpc server: encode reply error: {}", reason);
                        invocation_writer.write(&header, &()).await
                    }
                    written => written,
                }
            }
            Ok((_, Err(text))) => {
                header.error = text;
                invocation_writer.write(&header, &()).await
            }
            Err(e) => {
                error!("rpc server: {} panicked: {}", header.service_method, e);
                header.error = format!("rpc server: method {} panicked", header.service_method);
                invocation_writer.write(&header, &()).await
            }
        };
        let _ = sent_tx.send(());
    });

    if timeout.is_zero() {
        let _ = called_rx.await;
        let _ = sent_rx.await;
        return;
    }

    tokio::select! {
        _ = &mut called_rx => {
            let _ = sent_rx.await;
        }
        _ = tokio::time::sleep(timeout) => {
            called_rx.close();
            if called_rx.try_recv().is_ok() {
                // The result won the race after all.
                let _ = sent_rx.await;
                return;
            }

            let mut header = timeout_header;
            header.error = format!(
                "rpc server: request handle timeout: expect within {:?}",
                timeout
            );
            let _ = writer.write(&header, &()).await;
        }
    }
}
