//! Duplex byte channels.
//!
//! A [`DuplexStream`] is the uniform bidirectional byte channel the relay
//! works with, whatever the wire looks like underneath. It is split into a
//! read half and a write half so both relay directions can run at once.
//!
//! Two implementations exist:
//!
//! - [`NativeStream`]: a transport that is already a byte stream (TCP, TLS).
//!   End of input is a write-half shutdown.
//! - [`FramedStream`]: a WebSocket, where binary frames carry bytes and a
//!   reserved control frame stands in for half-close.
//!
//! After `close()` or an observed end of input, reads return `Ok(0)` and
//! writes fail with [`std::io::ErrorKind::BrokenPipe`].

pub mod framed;
pub mod native;

pub use framed::{ControlSignal, Frame, FramedReader, FramedStream, FramedWriter, WireMessage};
pub use native::{NativeReader, NativeStream, NativeWriter};

use std::future::Future;
use std::io;

/// Read half of a duplex channel.
pub trait DuplexRead: Send + 'static {
    /// Read bytes into `buf`. `Ok(0)` means end of stream.
    fn read(&mut self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send;
}

/// Write half of a duplex channel.
pub trait DuplexWrite: Send + 'static {
    /// Write the whole buffer.
    fn write_all(&mut self, buf: &[u8]) -> impl Future<Output = io::Result<()>> + Send;

    /// Tell the peer no more bytes will follow, keeping the inbound
    /// direction open.
    fn signal_input_end(&mut self) -> impl Future<Output = io::Result<()>> + Send;

    /// Release the transport in both directions.
    fn close(&mut self) -> impl Future<Output = io::Result<()>> + Send;
}

/// A bidirectional byte channel that can be split into independent halves.
pub trait DuplexStream: Send + 'static {
    type Reader: DuplexRead;
    type Writer: DuplexWrite;

    fn into_split(self) -> (Self::Reader, Self::Writer);
}

pub(crate) fn broken_pipe() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "stream closed")
}

/// Read one byte at a time until `\n`, bounded by `limit` bytes.
///
/// Returns `Ok(None)` when the stream ends before a newline arrives. Bytes
/// after the newline are never consumed.
pub(crate) async fn read_line<R: DuplexRead>(
    reader: &mut R,
    limit: usize,
) -> io::Result<Option<Vec<u8>>> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        if reader.read(&mut byte).await? == 0 {
            return Ok(None);
        }
        line.push(byte[0]);
        if byte[0] == b'\n' {
            return Ok(Some(line));
        }
        if line.len() >= limit {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "line exceeds limit",
            ));
        }
    }
}
