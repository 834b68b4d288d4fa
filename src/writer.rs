//! Frame writer using scatter/gather I/O.
//!
//! Each frame goes out as three slices (prefix, header, body) in a single
//! `write_vectored` call when the kernel buffer has room, followed by a flush.
//! Callers serialize access themselves; see [`crate::codec::CodecWriter`].

use std::io::IoSlice;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{Result, RpcError};
use crate::protocol::build_frame_parts;

/// Writes length-prefixed frames to an async writer.
pub struct FrameWriter<W> {
    inner: W,
}

impl<W> FrameWriter<W>
where
    W: AsyncWrite + Unpin,
{
    /// Wrap a writer.
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Write one frame and flush.
    pub async fn write_frame(&mut self, header: &[u8], body: &[u8]) -> Result<()> {
        let prefix = build_frame_parts(header, body);
        let parts: [&[u8]; 3] = [&prefix, header, body];
        let total_size: usize = parts.iter().map(|p| p.len()).sum();

        // Fast path: everything fits in one syscall.
        let mut total_written = self.inner.write_vectored(&slices_from(&parts, 0)).await?;

        while total_written < total_size {
            if total_written == 0 {
                return Err(write_zero());
            }

            let remaining = slices_from(&parts, total_written);
            let written = self.inner.write_vectored(&remaining).await?;
            if written == 0 {
                return Err(write_zero());
            }
            total_written += written;
        }

        self.inner.flush().await?;
        Ok(())
    }

    /// Shut down the write side of the underlying stream.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }

    #[cfg(test)]
    fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }
}

fn write_zero() -> RpcError {
    std::io::Error::new(std::io::ErrorKind::WriteZero, "write_vectored returned 0").into()
}

/// Build IoSlice array for the data left after `skip_bytes` were written.
fn slices_from<'a>(parts: &[&'a [u8]], skip_bytes: usize) -> Vec<IoSlice<'a>> {
    let mut slices = Vec::with_capacity(parts.len());
    let mut offset = 0;

    for part in parts {
        let start = offset;
        let end = offset + part.len();

        if skip_bytes < end && !part.is_empty() {
            let start_in_part = skip_bytes.saturating_sub(start);
            slices.push(IoSlice::new(&part[start_in_part..]));
        }
        offset = end;
    }

    slices
}
