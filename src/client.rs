//! RPC client: many concurrent calls multiplexed over one connection.
//!
//! Every call is tagged with a connection-scoped sequence number. A single
//! receive task matches responses back to pending calls by that number.
//!
//! # Example
//!
//! ```no_run
//! use wirerpc::{Client, Options};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::dial("127.0.0.1:9999", Options::default()).await?;
//!
//!     let sum: i64 = client.call("Arith.Sum", &(1, 2)).await?;
//!     assert_eq!(sum, 3);
//!
//!     client.close().await?;
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::codec::{new_codec_func, CodecReader, CodecWriter, Format};
use crate::control::{write_options, Options};
use crate::error::{Result, RpcError};
use crate::protocol::Header;
use crate::transport::{connect, split_boxed, Address, BoxedReader, BoxedWriter};

/// Capacity of the completion sink `go` creates when the caller gives none.
pub const DEFAULT_SINK_CAPACITY: usize = 10;

/// A finished call.
#[derive(Debug)]
pub struct Call<R> {
    /// Sequence number the call was sent with (0 if it was never sent).
    pub seq: u64,
    /// Target in `"Service.Method"` form.
    pub service_method: String,
    /// Decoded reply, present on success.
    pub reply: Option<R>,
    /// Failure, if any.
    pub error: Option<RpcError>,
}

impl<R> Call<R> {
    /// Convert into the reply or the error.
    pub fn into_result(self) -> Result<R> {
        match (self.error, self.reply) {
            (Some(err), _) => Err(err),
            (None, Some(reply)) => Ok(reply),
            (None, None) => Err(RpcError::Decode("reading body error: missing reply".into())),
        }
    }
}

/// Handle to a call issued with [`Client::go`].
#[derive(Debug)]
pub struct AsyncCall<R> {
    /// Sequence number the call was sent with (0 if it was never sent).
    pub seq: u64,
    /// Target in `"Service.Method"` form.
    pub service_method: String,
    receiver: Option<mpsc::Receiver<Call<R>>>,
}

impl<R> AsyncCall<R> {
    /// Wait for completion.
    ///
    /// Returns `None` when the call was issued with a caller-owned sink; the
    /// result is delivered there instead.
    pub async fn done(&mut self) -> Option<Call<R>> {
        match &mut self.receiver {
            Some(receiver) => receiver.recv().await,
            None => None,
        }
    }
}

type Completer = Box<dyn FnOnce(u64, Result<Bytes>) + Send>;

/// A call waiting for its response.
struct PendingCall {
    service_method: String,
    complete: Completer,
}

struct ClientState {
    seq: u64,
    pending: HashMap<u64, PendingCall>,
    /// Set by the user through `close()`.
    closing: bool,
    /// Set once the connection failed.
    shutdown: bool,
}

struct ClientInner {
    writer: CodecWriter,
    format: Format,
    options: Options,
    /// Keeps sequence assignment and request writes in the same order.
    sending: tokio::sync::Mutex<()>,
    state: Mutex<ClientState>,
    close_tx: watch::Sender<bool>,
}

impl ClientInner {
    fn register_call(&self, call: PendingCall) -> std::result::Result<u64, PendingCall> {
        let mut state = self.state.lock();
        if state.closing || state.shutdown {
            return Err(call);
        }
        let seq = state.seq;
        state.seq += 1;
        state.pending.insert(seq, call);
        Ok(seq)
    }

    fn remove_call(&self, seq: u64) -> Option<PendingCall> {
        self.state.lock().pending.remove(&seq)
    }

    /// Fail every pending call with `err` and refuse new ones.
    async fn terminate_calls(&self, err: RpcError) {
        let _sending = self.sending.lock().await;
        let calls: Vec<(u64, PendingCall)> = {
            let mut state = self.state.lock();
            state.shutdown = true;
            state.pending.drain().collect()
        };

        if !calls.is_empty() {
            debug!("rpc client: failing {} pending calls: {}", calls.len(), err);
        }
        for (seq, call) in calls {
            (call.complete)(seq, Err(err.clone()));
        }
    }

    /// Register `call` and write its request.
    ///
    /// The returned guard forgets the call when dropped, unless it was kept.
    /// Dropping this future partway through the write forgets it too.
    async fn send<A>(&self, service_method: &str, args: &A, call: PendingCall) -> PendingGuard<'_>
    where
        A: Serialize + ?Sized,
    {
        let _sending = self.sending.lock().await;

        let seq = match self.register_call(call) {
            Ok(seq) => seq,
            Err(call) => {
                (call.complete)(0, Err(RpcError::Shutdown));
                return PendingGuard::new(self, 0);
            }
        };
        let pending = PendingGuard::new(self, seq);

        let header = Header::new(service_method, seq);
        if let Err(err) = self.writer.write(&header, args).await {
            if let Some(call) = self.remove_call(seq) {
                (call.complete)(seq, Err(err));
            }
        }
        pending
    }
}

/// Forgets a pending call when its caller stops waiting for it.
///
/// A call still registered on drop is completed with `context canceled`, so
/// its sink hears about it exactly once. A response arriving later is
/// discarded as unknown.
struct PendingGuard<'a> {
    inner: &'a ClientInner,
    seq: u64,
    armed: bool,
}

impl<'a> PendingGuard<'a> {
    fn new(inner: &'a ClientInner, seq: u64) -> Self {
        Self { inner, seq, armed: true }
    }

    /// Leave the call registered and return its sequence number.
    fn keep(mut self) -> u64 {
        self.armed = false;
        self.seq
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(call) = self.inner.remove_call(self.seq) {
            debug!("rpc client: gave up on {} seq {}", call.service_method, self.seq);
            (call.complete)(self.seq, Err(RpcError::Canceled("context canceled".to_string())));
        }
    }
}

/// An RPC client bound to one connection.
///
/// Share it between tasks behind an `Arc`. Dropping it closes the connection.
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Dial a TCP address.
    pub async fn dial(address: &str, options: Options) -> Result<Self> {
        Self::dial_address(Address::Tcp(address.to_string()), options).await
    }

    /// Dial a `protocol@addr` address: `tcp@host:port` or `unix@/path`.
    pub async fn xdial(rpc_addr: &str, options: Options) -> Result<Self> {
        let address: Address = rpc_addr.parse()?;
        Self::dial_address(address, options).await
    }

    async fn dial_address(address: Address, options: Options) -> Result<Self> {
        let options = options.normalized();
        let timeout = options.connect_timeout;

        let connecting = async move {
            let (reader, writer) = connect(&address).await?;
            Self::from_parts(reader, writer, options).await
        };

        if timeout.is_zero() {
            return connecting.await;
        }
        match tokio::time::timeout(timeout, connecting).await {
            Ok(result) => result,
            Err(_) => Err(RpcError::ConnectTimeout(timeout)),
        }
    }

    /// Create a client over an already connected stream.
    ///
    /// Sends the handshake and starts the receive task.
    pub async fn new<S>(stream: S, options: Options) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (reader, writer) = split_boxed(stream);
        Self::from_parts(reader, writer, options.normalized()).await
    }

    async fn from_parts(reader: BoxedReader, mut writer: BoxedWriter, options: Options) -> Result<Self> {
        let new_codec = new_codec_func(&options.codec_type)
            .ok_or_else(|| RpcError::InvalidCodecType(options.codec_type.clone()))?;

        write_options(&mut writer, &options).await?;

        let codec = new_codec(reader, writer);
        let format = codec.format();
        let (reader, writer) = codec.into_split();
        let (close_tx, close_rx) = watch::channel(false);

        let inner = Arc::new(ClientInner {
            writer,
            format,
            options,
            sending: tokio::sync::Mutex::new(()),
            state: Mutex::new(ClientState {
                seq: 1,
                pending: HashMap::new(),
                closing: false,
                shutdown: false,
            }),
            close_tx,
        });

        tokio::spawn(receive(inner.clone(), reader, close_rx));
        Ok(Self { inner })
    }

    /// Options the connection was opened with.
    pub fn options(&self) -> &Options {
        &self.inner.options
    }

    /// Whether new calls may still be issued.
    pub fn is_available(&self) -> bool {
        let state = self.inner.state.lock();
        !state.closing && !state.shutdown
    }

    /// Close the connection. A second close returns `Shutdown`.
    pub async fn close(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            if state.closing {
                return Err(RpcError::Shutdown);
            }
            state.closing = true;
        }
        self.inner.close_tx.send_replace(true);
        self.inner.writer.close().await
    }

    /// Issue a call without waiting for its response.
    ///
    /// Returns once the request is written. Completion is posted to `sink`,
    /// or to a sink of capacity [`DEFAULT_SINK_CAPACITY`] owned by the
    /// returned handle when `sink` is `None`.
    ///
    /// A full sink never holds up other calls: the completion waits for
    /// capacity on its own task, so completions may then arrive out of order.
    /// Keep receiving from a caller-owned sink or calls pile up behind it.
    pub async fn go<A, R>(
        &self,
        service_method: &str,
        args: &A,
        sink: Option<mpsc::Sender<Call<R>>>,
    ) -> AsyncCall<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned + Send + 'static,
    {
        let (sink, receiver) = match sink {
            Some(sink) => (sink, None),
            None => {
                let (tx, rx) = mpsc::channel(DEFAULT_SINK_CAPACITY);
                (tx, Some(rx))
            }
        };

        let call = self.pending_call(service_method, sink);
        let seq = self.inner.send(service_method, args, call).await.keep();

        AsyncCall {
            seq,
            service_method: service_method.to_string(),
            receiver,
        }
    }

    /// Issue a call and wait for its reply.
    ///
    /// Dropping the returned future forgets the call.
    pub async fn call<A, R>(&self, service_method: &str, args: &A) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned + Send + 'static,
    {
        let (sink, mut receiver) = mpsc::channel::<Call<R>>(1);
        let call = self.pending_call(service_method, sink);
        let _pending = self.inner.send(service_method, args, call).await;

        receiver.recv().await.ok_or(RpcError::Shutdown)?.into_result()
    }

    /// Issue a call and wait for its reply or for `cancel` to resolve.
    ///
    /// Cancelling forgets the pending call; a response arriving later is
    /// discarded. The request already written is not retracted.
    pub async fn call_with_cancel<A, R, C>(&self, service_method: &str, args: &A, cancel: C) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned + Send + 'static,
        C: Future<Output = ()>,
    {
        self.call_until(service_method, args, cancel, "context canceled").await
    }

    /// Issue a call and wait at most `timeout` for its reply.
    pub async fn call_timeout<A, R>(&self, service_method: &str, args: &A, timeout: Duration) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned + Send + 'static,
    {
        self.call_until(service_method, args, tokio::time::sleep(timeout), "context deadline exceeded")
            .await
    }

    async fn call_until<A, R, C>(&self, service_method: &str, args: &A, cancel: C, reason: &str) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned + Send + 'static,
        C: Future<Output = ()>,
    {
        let (sink, mut receiver) = mpsc::channel::<Call<R>>(1);
        let call = self.pending_call(service_method, sink);
        let _pending = self.inner.send(service_method, args, call).await;

        tokio::select! {
            done = receiver.recv() => done.ok_or(RpcError::Shutdown)?.into_result(),
            _ = cancel => Err(RpcError::Canceled(reason.to_string())),
        }
    }

    /// Build the pending entry that decodes a response and posts it to `sink`.
    fn pending_call<R>(&self, service_method: &str, sink: mpsc::Sender<Call<R>>) -> PendingCall
    where
        R: DeserializeOwned + Send + 'static,
    {
        let format = self.inner.format;
        let name = service_method.to_string();
        let complete: Completer = Box::new(move |seq: u64, result: Result<Bytes>| {
            let (reply, error) = match result.and_then(|body| decode_reply::<R>(format, &body)) {
                Ok(reply) => (Some(reply), None),
                Err(err) => (None, Some(err)),
            };
            deliver(
                sink,
                Call {
                    seq,
                    service_method: name,
                    reply,
                    error,
                },
            );
        });

        PendingCall {
            service_method: service_method.to_string(),
            complete,
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.inner.close_tx.send_replace(true);
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("codec_type", &self.inner.options.codec_type)
            .field("available", &self.is_available())
            .finish()
    }
}

fn decode_reply<R: DeserializeOwned>(format: Format, body: &[u8]) -> Result<R> {
    format.decode(body).map_err(|err| {
        let msg = match err {
            RpcError::Decode(msg) => msg,
            other => other.to_string(),
        };
        RpcError::Decode(format!("reading body error: {}", msg))
    })
}

fn deliver<R: Send + 'static>(sink: mpsc::Sender<Call<R>>, call: Call<R>) {
    let call = match sink.try_send(call) {
        Err(mpsc::error::TrySendError::Full(call)) => call,
        _ => return,
    };

    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                let _ = sink.send(call).await;
            });
        }
        Err(_) => debug!(
            "rpc client: discarding {} seq {} result, sink is full",
            call.service_method, call.seq
        ),
    }
}

/// Receive loop: one per client, ends on the first read error or on close.
async fn receive(inner: Arc<ClientInner>, mut reader: CodecReader, mut close_rx: watch::Receiver<bool>) {
    let err = loop {
        let header = tokio::select! {
            result = reader.read_header() => match result {
                Ok(header) => header,
                Err(err) => break err,
            },
            _ = close_rx.changed() => break RpcError::Shutdown,
        };

        match inner.remove_call(header.seq) {
            None => {
                debug!("rpc client: discard response seq {}", header.seq);
                reader.discard_body();
            }
            Some(call) if header.is_error() => {
                reader.discard_body();
                (call.complete)(header.seq, Err(RpcError::Remote(header.error)));
            }
            Some(call) => {
                let body = reader.take_body();
                (call.complete)(header.seq, Ok(body));
            }
        }
    };

    inner.terminate_calls(err).await;
    let _ = inner.writer.close().await;
}
