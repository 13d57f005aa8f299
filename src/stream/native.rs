//! Byte-stream transports (TCP, TLS over TCP).

use std::io;

use tokio::io::{split, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tracing::trace;

use super::{broken_pipe, DuplexRead, DuplexStream, DuplexWrite};

/// Pass-through adapter over a native byte stream.
pub struct NativeStream<T> {
    inner: T,
}

impl<T> NativeStream<T>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

impl<T> DuplexStream for NativeStream<T>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    type Reader = NativeReader<T>;
    type Writer = NativeWriter<T>;

    fn into_split(self) -> (Self::Reader, Self::Writer) {
        let (read_half, write_half) = split(self.inner);
        (
            NativeReader {
                inner: read_half,
                finished: false,
            },
            NativeWriter {
                inner: write_half,
                closed: false,
            },
        )
    }
}

/// Read half of a [`NativeStream`].
pub struct NativeReader<T> {
    inner: ReadHalf<T>,
    finished: bool,
}

impl<T> DuplexRead for NativeReader<T>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.finished || buf.is_empty() {
            return Ok(0);
        }
        let n = self.inner.read(buf).await?;
        if n == 0 {
            trace!("native stream: peer finished sending");
            self.finished = true;
        }
        Ok(n)
    }
}

/// Write half of a [`NativeStream`].
pub struct NativeWriter<T> {
    inner: WriteHalf<T>,
    closed: bool,
}

impl<T> DuplexWrite for NativeWriter<T>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        if self.closed {
            return Err(broken_pipe());
        }
        self.inner.write_all(buf).await?;
        self.inner.flush().await
    }

    /// Half-close: for TCP this is `shutdown(Write)`, the peer reads EOF
    /// while our inbound direction stays open.
    async fn signal_input_end(&mut self) -> io::Result<()> {
        if self.closed {
            return Err(broken_pipe());
        }
        self.closed = true;
        self.inner.shutdown().await
    }

    async fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.inner.shutdown().await
    }
}
