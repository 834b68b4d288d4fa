//! Framed codec over a connection.
//!
//! [`CodecReader`] pulls frames through a [`FrameBuffer`] and hands out the
//! decoded header first, keeping the body until the caller decides whether to
//! decode or discard it. [`CodecWriter`] is cheaply cloneable and serializes
//! header+body pairs under one lock so concurrent writers never interleave.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;

use super::Format;
use crate::error::{Result, RpcError};
use crate::protocol::{Frame, FrameBuffer, Header, Prefix, DEFAULT_MAX_PAYLOAD_SIZE};
use crate::transport::{BoxedReader, BoxedWriter};
use crate::writer::FrameWriter;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// A connection's codec: framed reader plus serialized writer.
pub struct Codec {
    reader: CodecReader,
    writer: CodecWriter,
}

impl Codec {
    /// Create a codec over split connection halves.
    pub fn new(reader: BoxedReader, writer: BoxedWriter, format: Format) -> Self {
        Self {
            reader: CodecReader::new(reader, format),
            writer: CodecWriter::new(writer, format),
        }
    }

    /// Set the largest header or body segment read or written.
    pub fn with_max_payload(mut self, max_payload_size: u32) -> Self {
        self.reader.buffer = FrameBuffer::with_max_payload(max_payload_size);
        self.writer.max_payload = max_payload_size;
        self
    }

    /// Serialization format of this connection.
    pub fn format(&self) -> Format {
        self.reader.format
    }

    /// Split into the reader and the shareable writer.
    pub fn into_split(self) -> (CodecReader, CodecWriter) {
        (self.reader, self.writer)
    }
}

/// Read side of a codec.
pub struct CodecReader {
    reader: BoxedReader,
    buffer: FrameBuffer,
    ready: VecDeque<Frame>,
    body: Option<Bytes>,
    read_buf: Vec<u8>,
    format: Format,
}

impl CodecReader {
    fn new(reader: BoxedReader, format: Format) -> Self {
        Self {
            reader,
            buffer: FrameBuffer::new(),
            ready: VecDeque::new(),
            body: None,
            read_buf: vec![0u8; READ_BUFFER_SIZE],
            format,
        }
    }

    /// Read the next frame and decode its header.
    ///
    /// The body is kept for [`read_body`](Self::read_body) or
    /// [`discard_body`](Self::discard_body); reading the next header drops it.
    /// A header that fails to decode is a `Decode` error and the stream stays
    /// usable. Connection failures are `ConnectionClosed`, `Io` or `Protocol`.
    ///
    /// Cancel safe: bytes already read stay buffered for the next call.
    pub async fn read_header(&mut self) -> Result<Header> {
        let frame = self.next_frame().await?;
        self.body = Some(frame.body);
        self.format.decode(&frame.header)
    }

    /// Decode the pending body.
    pub fn read_body<T: DeserializeOwned>(&mut self) -> Result<T> {
        let body = self.take_body();
        self.format.decode(&body)
    }

    /// Take the pending body without decoding it.
    pub fn take_body(&mut self) -> Bytes {
        self.body.take().unwrap_or_default()
    }

    /// Drop the pending body.
    pub fn discard_body(&mut self) {
        self.body = None;
    }

    /// Serialization format of this connection.
    pub fn format(&self) -> Format {
        self.format
    }

    async fn next_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = self.ready.pop_front() {
                return Ok(frame);
            }

            let n = self.reader.read(&mut self.read_buf).await?;
            if n == 0 {
                if !self.buffer.is_empty() {
                    tracing::debug!(
                        "rpc codec: peer closed with {} bytes of a partial frame buffered",
                        self.buffer.len()
                    );
                }
                return Err(RpcError::ConnectionClosed);
            }

            let frames = self.buffer.push(&self.read_buf[..n])?;
            self.ready.extend(frames);
        }
    }
}

struct WriterState {
    writer: FrameWriter<BoxedWriter>,
    closed: bool,
}

/// Write side of a codec, shared by every task answering on the connection.
#[derive(Clone)]
pub struct CodecWriter {
    state: Arc<Mutex<WriterState>>,
    format: Format,
    max_payload: u32,
}

impl CodecWriter {
    fn new(writer: BoxedWriter, format: Format) -> Self {
        Self {
            state: Arc::new(Mutex::new(WriterState {
                writer: FrameWriter::new(writer),
                closed: false,
            })),
            format,
            max_payload: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }

    /// Write a header and body as one frame, then flush.
    pub async fn write<T: Serialize + ?Sized>(&self, header: &Header, body: &T) -> Result<()> {
        self.write_with(header, |format| format.encode(body)).await
    }

    /// Write a header and a body produced by `encode_body`.
    ///
    /// Encoding happens under the write lock. An encode or write error shuts
    /// the connection's write side and every later write fails. A segment over
    /// the payload limit is an `Encode` error for this frame only: nothing is
    /// written and the writer stays open.
    ///
    /// Cancel safe: once a frame starts going out it is finished on a
    /// separate task, so dropping this future never leaves half a frame on
    /// the wire.
    pub async fn write_with<F>(&self, header: &Header, encode_body: F) -> Result<()>
    where
        F: FnOnce(Format) -> Result<Vec<u8>>,
    {
        let mut state = self.state.clone().lock_owned().await;
        if state.closed {
            return Err(RpcError::Shutdown);
        }

        let (header_bytes, body_bytes) = match self.encode_frame(header, encode_body) {
            Ok(parts) => parts,
            Err(err) => {
                tracing::error!(
                    "rpc codec: encoding {} seq {} failed: {}",
                    header.service_method,
                    header.seq,
                    err
                );
                state.closed = true;
                let _ = state.writer.shutdown().await;
                return Err(err);
            }
        };

        if let Err(err) = self.check_size(&header_bytes, &body_bytes) {
            tracing::warn!(
                "rpc codec: refusing {} seq {}: {}",
                header.service_method,
                header.seq,
                err
            );
            return Err(err);
        }

        let service_method = header.service_method.clone();
        let seq = header.seq;
        let writing = tokio::spawn(async move {
            let result = state.writer.write_frame(&header_bytes, &body_bytes).await;
            if let Err(err) = &result {
                tracing::error!("rpc codec: writing {} seq {} failed: {}", service_method, seq, err);
                state.closed = true;
                let _ = state.writer.shutdown().await;
            }
            result
        });

        match writing.await {
            Ok(result) => result,
            Err(err) => Err(std::io::Error::other(err).into()),
        }
    }

    fn encode_frame<F>(&self, header: &Header, encode_body: F) -> Result<(Vec<u8>, Vec<u8>)>
    where
        F: FnOnce(Format) -> Result<Vec<u8>>,
    {
        let header_bytes = self.format.encode(header)?;
        let body_bytes = encode_body(self.format)?;
        Ok((header_bytes, body_bytes))
    }

    /// Both segments must fit the prefix and the peer's payload limit.
    fn check_size(&self, header: &[u8], body: &[u8]) -> Result<()> {
        let segment_len = |name: &str, len: usize| {
            u32::try_from(len).map_err(|_| {
                RpcError::Encode(format!(
                    "{} size {} exceeds maximum {}",
                    name, len, self.max_payload
                ))
            })
        };
        let prefix = Prefix::new(segment_len("Header", header.len())?, segment_len("Body", body.len())?);
        prefix.validate(self.max_payload).map_err(|err| match err {
            RpcError::Protocol(msg) => RpcError::Encode(msg),
            other => other,
        })
    }

    /// Shut down the write side. Idempotent.
    pub async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Ok(());
        }
        state.closed = true;
        state.writer.shutdown().await
    }

    /// Whether the writer has been closed.
    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }

    /// Serialization format of this connection.
    pub fn format(&self) -> Format {
        self.format
    }
}
