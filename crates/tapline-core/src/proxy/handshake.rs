//! Greeting exchange and command-line read.

use std::io;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::debug;

use crate::command::{split_line, CLIENT_HELLO, CONTROL_BUFFER_SIZE, SERVER_HELLO};
use crate::error::{Error, Result};

/// The first line the client sent after the handshake.
#[derive(Debug, Clone)]
pub struct ControlLine {
    /// The command line, terminator included.
    pub line: String,
    /// Bytes that arrived after the line in the same read.
    pub trailing: Bytes,
}

/// Wait for the client hello and answer it.
///
/// Exactly one read of at most [`CONTROL_BUFFER_SIZE`] bytes is taken; it
/// must be the hello and nothing else.
pub async fn perform<S>(stream: &mut S, wait: Duration) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let hello = match timeout(wait, read_control(stream)).await {
        Ok(read) => read?,
        Err(_) => return Err(Error::HandshakeTimeout),
    };

    if &hello[..] != CLIENT_HELLO {
        debug!("Unexpected hello ({} bytes)", hello.len());
        return Err(Error::HandshakeMismatch);
    }

    stream.write_all(SERVER_HELLO).await?;
    Ok(())
}

/// Read the command line, optionally bounded by `wait`.
pub async fn read_command<R>(stream: &mut R, wait: Option<Duration>) -> Result<ControlLine>
where
    R: AsyncRead + Unpin,
{
    let mut data = match wait {
        Some(wait) => timeout(wait, read_control(stream))
            .await
            .map_err(|_| Error::CommandTimeout)??,
        None => read_control(stream).await?,
    };

    if data.is_empty() {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
    }

    let line_len = split_line(&data).0.len();
    let line = data.split_to(line_len);

    Ok(ControlLine {
        line: String::from_utf8_lossy(&line).into_owned(),
        trailing: data.freeze(),
    })
}

/// One read of at most [`CONTROL_BUFFER_SIZE`] bytes.
async fn read_control<R>(stream: &mut R) -> io::Result<BytesMut>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(CONTROL_BUFFER_SIZE);
    let mut bounded = (&mut buf).limit(CONTROL_BUFFER_SIZE);
    stream.read_buf(&mut bounded).await?;
    Ok(buf)
}
