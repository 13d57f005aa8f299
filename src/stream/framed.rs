//! Byte stream emulation over WebSocket frames.
//!
//! Binary frames carry raw bytes and are concatenated in arrival order.
//! Text frames are control signals; the only one defined is
//! [`ControlSignal::EndOfInput`], which stands in for a TCP half-close.
//! Unknown control payloads are dropped so newer peers can add signals.
//!
//! Ping, pong and close handling belong to the WebSocket library; none of
//! them reach callers of this adapter as data.

use std::io;
use std::marker::PhantomData;
use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::Mutex;
use tracing::{debug, trace};

use super::{broken_pipe, DuplexRead, DuplexStream, DuplexWrite};

/// A transport message reduced to what the adapter cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Binary(Vec<u8>),
    Text(String),
    /// The peer started the closing handshake.
    Close,
    /// Ping, pong and anything else the transport handles itself.
    Other,
}

/// Message types the framed adapter can carry.
///
/// Implemented for the server's axum messages and the client's tungstenite
/// messages.
pub trait WireMessage: Send + Sized + 'static {
    fn into_frame(self) -> Frame;
    fn binary(data: &[u8]) -> Self;
    fn text(payload: &str) -> Self;
}

impl WireMessage for axum::extract::ws::Message {
    fn into_frame(self) -> Frame {
        use axum::extract::ws::Message;
        match self {
            Message::Binary(data) => Frame::Binary(data.to_vec()),
            Message::Text(text) => Frame::Text(text.as_str().to_owned()),
            Message::Close(_) => Frame::Close,
            _ => Frame::Other,
        }
    }

    fn binary(data: &[u8]) -> Self {
        Self::Binary(axum::body::Bytes::copy_from_slice(data))
    }

    fn text(payload: &str) -> Self {
        Self::Text(payload.to_owned().into())
    }
}

impl WireMessage for tokio_tungstenite::tungstenite::Message {
    fn into_frame(self) -> Frame {
        use tokio_tungstenite::tungstenite::Message;
        match self {
            Message::Binary(data) => Frame::Binary(data),
            Message::Text(text) => Frame::Text(text),
            Message::Close(_) => Frame::Close,
            _ => Frame::Other,
        }
    }

    fn binary(data: &[u8]) -> Self {
        Self::Binary(data.to_vec())
    }

    fn text(payload: &str) -> Self {
        Self::Text(payload.to_owned())
    }
}

/// In-band control signals carried as text frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// The sender will not send any more data.
    EndOfInput,
}

impl ControlSignal {
    const END_OF_INPUT: &'static str = "__DEPOT_EOF__";

    /// Wire payload of this signal.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EndOfInput => Self::END_OF_INPUT,
        }
    }

    /// Recognize a text frame payload, `None` for unknown signals.
    pub fn parse(payload: &str) -> Option<Self> {
        match payload {
            Self::END_OF_INPUT => Some(Self::EndOfInput),
            _ => None,
        }
    }
}

/// Duplex stream over a WebSocket transport.
pub struct FramedStream<T, M> {
    transport: T,
    _message: PhantomData<fn() -> M>,
}

impl<T, M, E> FramedStream<T, M>
where
    T: Stream<Item = Result<M, E>> + Sink<M, Error = E> + Send + 'static,
    M: WireMessage,
    E: std::error::Error + Send + Sync + 'static,
{
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            _message: PhantomData,
        }
    }
}

impl<T, M, E> DuplexStream for FramedStream<T, M>
where
    T: Stream<Item = Result<M, E>> + Sink<M, Error = E> + Send + 'static,
    M: WireMessage,
    E: std::error::Error + Send + Sync + 'static,
{
    type Reader = FramedReader<T>;
    type Writer = FramedWriter<T, M>;

    fn into_split(self) -> (Self::Reader, Self::Writer) {
        let (sink, source) = self.transport.split();
        (
            FramedReader {
                source,
                current: None,
                finished: false,
            },
            FramedWriter {
                shared: Arc::new(Mutex::new(SinkState {
                    sink,
                    input_ended: false,
                    released: false,
                })),
            },
        )
    }
}

/// The binary frame currently being drained.
struct FrameCursor {
    data: Vec<u8>,
    pos: usize,
}

impl FrameCursor {
    fn copy_into(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        n
    }

    fn is_exhausted(&self) -> bool {
        self.pos >= self.data.len()
    }
}

/// Read half of a [`FramedStream`].
pub struct FramedReader<T> {
    source: SplitStream<T>,
    current: Option<FrameCursor>,
    finished: bool,
}

impl<T, M, E> DuplexRead for FramedReader<T>
where
    T: Stream<Item = Result<M, E>> + Send + 'static,
    M: WireMessage,
    E: std::error::Error + Send + Sync + 'static,
{
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.finished {
                return Ok(0);
            }

            if let Some(frame) = self.current.as_mut() {
                let n = frame.copy_into(buf);
                if frame.is_exhausted() {
                    self.current = None;
                }
                // Never wait for the next frame to fill a short read.
                if n > 0 {
                    return Ok(n);
                }
                continue;
            }

            match self.source.next().await {
                None => {
                    trace!("framed stream: transport ended");
                    self.finished = true;
                }
                Some(Err(e)) => {
                    self.finished = true;
                    return Err(io::Error::other(e));
                }
                Some(Ok(message)) => match message.into_frame() {
                    Frame::Binary(data) => {
                        trace!("framed stream: binary frame of {} bytes", data.len());
                        self.current = Some(FrameCursor { data, pos: 0 });
                    }
                    Frame::Text(payload) => match ControlSignal::parse(&payload) {
                        Some(ControlSignal::EndOfInput) => {
                            debug!("framed stream: peer signalled end of input");
                            self.finished = true;
                        }
                        None => {
                            debug!("framed stream: ignoring unknown control frame");
                        }
                    },
                    Frame::Close => {
                        trace!("framed stream: close frame");
                        self.finished = true;
                    }
                    Frame::Other => {}
                },
            }
        }
    }
}

struct SinkState<T, M> {
    sink: SplitSink<T, M>,
    input_ended: bool,
    released: bool,
}

/// Write half of a [`FramedStream`].
///
/// Clones share one write guard, so concurrent writers never interleave
/// frames.
pub struct FramedWriter<T, M> {
    shared: Arc<Mutex<SinkState<T, M>>>,
}

impl<T, M> Clone for FramedWriter<T, M> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, M, E> DuplexWrite for FramedWriter<T, M>
where
    T: Sink<M, Error = E> + Send + 'static,
    M: WireMessage,
    E: std::error::Error + Send + Sync + 'static,
{
    /// One call, one binary frame.
    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        let mut state = self.shared.lock().await;
        if state.input_ended || state.released {
            return Err(broken_pipe());
        }
        if buf.is_empty() {
            return Ok(());
        }
        state.sink.send(M::binary(buf)).await.map_err(io::Error::other)
    }

    async fn signal_input_end(&mut self) -> io::Result<()> {
        let mut state = self.shared.lock().await;
        if state.input_ended || state.released {
            return Err(broken_pipe());
        }
        state.input_ended = true;
        state
            .sink
            .send(M::text(ControlSignal::EndOfInput.as_str()))
            .await
            .map_err(io::Error::other)
    }

    async fn close(&mut self) -> io::Result<()> {
        let mut state = self.shared.lock().await;
        if state.released {
            return Ok(());
        }
        state.released = true;
        state.sink.close().await.map_err(io::Error::other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::DuplexStream as Pipe;
    use tokio_tungstenite::tungstenite::protocol::Role;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::WebSocketStream;

    type Ws = WebSocketStream<Pipe>;

    /// A connected pair: the adapter under test and a raw peer.
    async fn pair() -> (FramedStream<Ws, Message>, Ws) {
        let (a, b) = tokio::io::duplex(256 * 1024);
        let local = WebSocketStream::from_raw_socket(a, Role::Server, None).await;
        let peer = WebSocketStream::from_raw_socket(b, Role::Client, None).await;
        (FramedStream::new(local), peer)
    }

    async fn read_to_end<R: DuplexRead>(reader: &mut R, chunk: usize) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = vec![0u8; chunk];
        loop {
            let n = reader.read(&mut buf).await.unwrap();
            if n == 0 {
                return out;
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    #[test]
    fn test_control_signal_parse() {
        assert_eq!(
            ControlSignal::parse("__DEPOT_EOF__"),
            Some(ControlSignal::EndOfInput)
        );
        assert_eq!(ControlSignal::parse("__DEPOT_EOF__\n"), None);
        assert_eq!(ControlSignal::parse("resize"), None);
        assert_eq!(
            ControlSignal::parse(ControlSignal::EndOfInput.as_str()),
            Some(ControlSignal::EndOfInput)
        );
    }

    #[test]
    fn test_frame_classification() {
        assert_eq!(
            Message::Binary(vec![1, 2]).into_frame(),
            Frame::Binary(vec![1, 2])
        );
        assert_eq!(
            Message::Text("hi".into()).into_frame(),
            Frame::Text("hi".into())
        );
        assert_eq!(Message::Ping(vec![]).into_frame(), Frame::Other);
        assert_eq!(Message::Close(None).into_frame(), Frame::Close);

        use axum::extract::ws::Message as AxumMessage;
        assert_eq!(
            <AxumMessage as WireMessage>::binary(b"ab").into_frame(),
            Frame::Binary(b"ab".to_vec())
        );
        assert_eq!(
            <AxumMessage as WireMessage>::text("x").into_frame(),
            Frame::Text("x".into())
        );
    }

    #[tokio::test]
    async fn test_frames_reassemble_in_order() {
        let (stream, mut peer) = pair().await;
        let (mut reader, _writer) = stream.into_split();

        peer.send(Message::Binary(b"hel".to_vec())).await.unwrap();
        peer.send(Message::Binary(b"lo ".to_vec())).await.unwrap();
        peer.send(Message::Binary(b"world".to_vec())).await.unwrap();
        peer.send(Message::Text(ControlSignal::EndOfInput.as_str().into()))
            .await
            .unwrap();

        assert_eq!(read_to_end(&mut reader, 4).await, b"hello world");
    }

    #[tokio::test]
    async fn test_short_read_stops_at_frame_boundary() {
        let (stream, mut peer) = pair().await;
        let (mut reader, _writer) = stream.into_split();

        peer.send(Message::Binary(b"abc".to_vec())).await.unwrap();
        peer.send(Message::Binary(b"def".to_vec())).await.unwrap();

        let mut buf = [0u8; 16];
        let n = reader.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"abc");
        let n = reader.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"def");
    }

    #[tokio::test]
    async fn test_end_of_input_is_reported_once_and_final() {
        let (stream, mut peer) = pair().await;
        let (mut reader, _writer) = stream.into_split();

        peer.send(Message::Binary(b"data".to_vec())).await.unwrap();
        peer.send(Message::Text(ControlSignal::EndOfInput.as_str().into()))
            .await
            .unwrap();
        peer.send(Message::Binary(b"after".to_vec())).await.unwrap();

        let mut buf = [0u8; 16];
        let n = reader.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"data");
        assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
        // Frames after the marker never show up as data.
        assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_text_frames_are_skipped() {
        let (stream, mut peer) = pair().await;
        let (mut reader, _writer) = stream.into_split();

        peer.send(Message::Text("resize 80x24".into())).await.unwrap();
        peer.send(Message::Binary(Vec::new())).await.unwrap();
        peer.send(Message::Binary(b"x".to_vec())).await.unwrap();

        let mut buf = [0u8; 8];
        let n = reader.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"x");
    }

    #[tokio::test]
    async fn test_each_write_is_one_binary_frame() {
        let (stream, mut peer) = pair().await;
        let (_reader, mut writer) = stream.into_split();

        writer.write_all(b"first").await.unwrap();
        writer.write_all(b"second").await.unwrap();

        assert_eq!(
            peer.next().await.unwrap().unwrap(),
            Message::Binary(b"first".to_vec())
        );
        assert_eq!(
            peer.next().await.unwrap().unwrap(),
            Message::Binary(b"second".to_vec())
        );
    }

    #[tokio::test]
    async fn test_concurrent_writers_never_interleave() {
        const BLOCK: usize = 1000;
        const ROUNDS: usize = 50;

        let (stream, mut peer) = pair().await;
        let (_reader, writer) = stream.into_split();

        let collector = tokio::spawn(async move {
            let mut frames = Vec::new();
            while frames.len() < ROUNDS * 2 {
                match peer.next().await {
                    Some(Ok(Message::Binary(data))) => frames.push(data),
                    Some(Ok(_)) => continue,
                    _ => break,
                }
            }
            frames
        });

        let mut tasks = Vec::new();
        for fill in [b'a', b'b'] {
            let mut writer = writer.clone();
            tasks.push(tokio::spawn(async move {
                let block = vec![fill; BLOCK];
                for _ in 0..ROUNDS {
                    writer.write_all(&block).await.unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let frames = collector.await.unwrap();
        assert_eq!(frames.len(), ROUNDS * 2);
        for frame in frames {
            assert_eq!(frame.len(), BLOCK);
            assert!(frame.iter().all(|b| *b == frame[0]));
        }
    }

    #[tokio::test]
    async fn test_signal_input_end_sends_marker() {
        let (stream, mut peer) = pair().await;
        let (_reader, mut writer) = stream.into_split();

        writer.signal_input_end().await.unwrap();
        assert_eq!(
            peer.next().await.unwrap().unwrap(),
            Message::Text("__DEPOT_EOF__".into())
        );

        let err = writer.write_all(b"late").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_close_ends_peer_stream() {
        let (stream, mut peer) = pair().await;
        let (_reader, mut writer) = stream.into_split();

        writer.close().await.unwrap();
        assert!(matches!(
            peer.next().await,
            Some(Ok(Message::Close(_)))
        ));
        assert!(writer.write_all(b"x").await.is_err());
        // Closing twice is harmless.
        writer.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_transport_error_is_surfaced() {
        let (a, b) = tokio::io::duplex(1024);
        let local = WebSocketStream::from_raw_socket(a, Role::Server, None).await;
        let (mut reader, _writer) = FramedStream::<_, Message>::new(local).into_split();

        // Peer vanishes without a closing handshake.
        drop(b);

        let mut buf = [0u8; 8];
        assert!(reader.read(&mut buf).await.is_err());
        assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
    }
}
