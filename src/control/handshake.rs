//! Handshake line I/O.
//!
//! - Line format: compact JSON object, exactly one `\n` terminator
//! - The reader never consumes more than [`MAX_HANDSHAKE_LEN`] bytes

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::Options;
use crate::codec::{new_codec_func, NewCodecFn};
use crate::error::{Result, RpcError};
use crate::protocol::MAGIC_NUMBER;

/// Upper bound on the handshake line, terminator included.
pub const MAX_HANDSHAKE_LEN: u64 = 4096;

/// Write the options line and flush.
pub async fn write_options<W>(writer: &mut W, options: &Options) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut line = serde_json::to_vec(options)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one options line.
///
/// Bytes after the terminator stay in `reader`'s buffer, so the same reader
/// must be used for the frames that follow.
pub async fn read_options<R>(reader: &mut R) -> Result<Options>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let n = (&mut *reader)
        .take(MAX_HANDSHAKE_LEN)
        .read_line(&mut line)
        .await?;

    if n == 0 {
        return Err(RpcError::ConnectionClosed);
    }
    if !line.ends_with('\n') {
        if n as u64 >= MAX_HANDSHAKE_LEN {
            return Err(RpcError::Protocol(format!(
                "options line exceeds {} bytes",
                MAX_HANDSHAKE_LEN
            )));
        }
        return Err(RpcError::ConnectionClosed);
    }

    serde_json::from_str(line.trim_end())
        .map_err(|e| RpcError::Protocol(format!("options error: {}", e)))
}

/// Check received options and resolve their codec constructor.
pub fn accept_options(options: &Options) -> Result<NewCodecFn> {
    if options.magic_number != MAGIC_NUMBER {
        return Err(RpcError::InvalidMagicNumber(options.magic_number));
    }
    new_codec_func(&options.codec_type)
        .ok_or_else(|| RpcError::InvalidCodecType(options.codec_type.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Format, JSON_TYPE};
    use tokio::io::{duplex, BufReader};

    #[tokio::test]
    async fn test_write_then_read() {
        let (mut client, server) = duplex(8192);
        let opts = Options::default().with_codec_type(JSON_TYPE);

        write_options(&mut client, &opts).await.unwrap();
        client.write_all(b"trailing frame bytes").await.unwrap();
        drop(client);

        let mut reader = BufReader::new(server);
        assert_eq!(read_options(&mut reader).await.unwrap(), opts);

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"trailing frame bytes");
    }

    #[tokio::test]
    async fn test_line_too_long() {
        let (mut client, server) = duplex(16 * 1024);
        client.write_all(&vec![b' '; 5000]).await.unwrap();

        let err = read_options(&mut BufReader::new(server)).await.unwrap_err();
        assert!(matches!(err, RpcError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_eof_before_line() {
        let (client, server) = duplex(64);
        drop(client);

        let err = read_options(&mut BufReader::new(server)).await.unwrap_err();
        assert!(matches!(err, RpcError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_garbage_line() {
        let (mut client, server) = duplex(64);
        client.write_all(b"hello\n").await.unwrap();

        let err = read_options(&mut BufReader::new(server)).await.unwrap_err();
        assert!(err.to_string().contains("options error"));
    }

    #[test]
    fn test_accept_options() {
        let codec = accept_options(&Options::default()).unwrap();
        let (a, _b) = duplex(64);
        let (r, w) = crate::transport::split_boxed(a);
        assert_eq!(codec(r, w).format(), Format::MsgPack);

        let forged = Options {
            magic_number: 0x123,
            ..Options::default()
        };
        assert!(matches!(
            accept_options(&forged),
            Err(RpcError::InvalidMagicNumber(0x123))
        ));

        let unknown = Options::default().with_codec_type("application/gob");
        assert!(matches!(
            accept_options(&unknown),
            Err(RpcError::InvalidCodecType(_))
        ));
    }
}
