//! Operator client: connect, authenticate, pump the local terminal.

pub mod terminal;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::error::DepotError;
use crate::protocol::client_handshake;
use crate::stream::{DuplexRead, DuplexStream, DuplexWrite, FramedStream, NativeStream};
use crate::Result;

pub use terminal::RawModeGuard;

/// Client side of a WebSocket session.
pub type WsClientStream = FramedStream<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

const PUMP_BUFFER: usize = 4096;

/// Open a raw byte-stream connection.
pub async fn connect_tcp(addr: &str) -> Result<NativeStream<TcpStream>> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    Ok(NativeStream::new(stream))
}

/// Open a WebSocket connection (`ws://` or `wss://`).
pub async fn connect_ws(url: &str) -> Result<WsClientStream> {
    let request = url
        .into_client_request()
        .map_err(|e| DepotError::InvalidAddress(format!("{}: {}", url, e)))?;
    if url.starts_with("wss://") {
        crate::server::tls::install_crypto_provider();
    }
    let (socket, response) = tokio_tungstenite::connect_async(request).await?;
    debug!(status = %response.status(), "websocket connected");
    Ok(FramedStream::new(socket))
}

/// Build the WebSocket URL for `addr`.
///
/// `addr` is either `host:port` or a full `ws://`/`wss://` URL. An empty or
/// `/` path is replaced with `path`. `secure` forces `wss`.
pub fn ws_url(addr: &str, path: &str, secure: bool) -> Result<String> {
    let (scheme, rest) = if let Some(rest) = addr.strip_prefix("wss://") {
        ("wss", rest)
    } else if let Some(rest) = addr.strip_prefix("ws://") {
        ("ws", rest)
    } else {
        ("ws", addr)
    };
    let scheme = if secure { "wss" } else { scheme };

    let (host, existing) = match rest.find('/') {
        Some(i) => rest.split_at(i),
        None => (rest, ""),
    };
    if host.is_empty() {
        return Err(DepotError::InvalidAddress(addr.to_string()));
    }

    let path = if existing.is_empty() || existing == "/" {
        path
    } else {
        existing
    };
    if path.starts_with('/') {
        Ok(format!("{}://{}{}", scheme, host, path))
    } else {
        Ok(format!("{}://{}/{}", scheme, host, path))
    }
}

/// Authenticate and relay `input` to the server and its output to `output`.
///
/// When `input` runs dry the server is told so (half-close or control
/// frame) and output keeps flowing. Returns once the server's output ends.
pub async fn run<D, I, O>(stream: D, secret: &str, mut input: I, mut output: O) -> Result<()>
where
    D: DuplexStream,
    I: AsyncRead + Unpin,
    O: AsyncWrite + Unpin,
{
    let (mut reader, mut writer) = stream.into_split();
    client_handshake(&mut reader, &mut writer, secret).await?;
    debug!("authenticated");

    let result = {
        let input_pump = pump_input(&mut input, &mut writer);
        let output_pump = pump_output(&mut reader, &mut output);
        tokio::pin!(input_pump);
        tokio::pin!(output_pump);

        let mut input_done = false;
        loop {
            tokio::select! {
                res = &mut input_pump, if !input_done => {
                    input_done = true;
                    if let Err(e) = res {
                        debug!("input pump stopped: {}", e);
                    }
                }
                res = &mut output_pump => break res,
            }
        }
    };

    let _ = writer.close().await;
    result.map_err(DepotError::from)
}

async fn pump_input<I, W>(input: &mut I, writer: &mut W) -> std::io::Result<()>
where
    I: AsyncRead + Unpin,
    W: DuplexWrite,
{
    let mut buf = vec![0u8; PUMP_BUFFER];
    loop {
        let n = input.read(&mut buf).await?;
        if n == 0 {
            debug!("local input exhausted");
            return writer.signal_input_end().await;
        }
        writer.write_all(&buf[..n]).await?;
    }
}

async fn pump_output<R, O>(reader: &mut R, output: &mut O) -> std::io::Result<()>
where
    R: DuplexRead,
    O: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; PUMP_BUFFER];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return output.flush().await;
        }
        output.write_all(&buf[..n]).await?;
        output.flush().await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{read_secret, send_verdict, Verdict};
    use tokio::io::duplex;
    use tokio_tungstenite::tungstenite::protocol::Role;

    /// Fake server: check the secret, collect input until end of input,
    /// then answer once and hang up.
    async fn answer_after_input<S: DuplexStream>(stream: S) {
        let (mut reader, mut writer) = stream.into_split();
        let secret = read_secret(&mut reader).await.unwrap();
        if secret != b"hunter2" {
            send_verdict(&mut writer, Verdict::Rejected).await.unwrap();
            writer.close().await.unwrap();
            return;
        }
        send_verdict(&mut writer, Verdict::Accepted).await.unwrap();

        let mut received = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            let n = reader.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            received.extend_from_slice(&buf[..n]);
        }
        let mut reply = b"got: ".to_vec();
        reply.extend_from_slice(&received);
        writer.write_all(&reply).await.unwrap();
        writer.close().await.unwrap();
    }

    #[test]
    fn test_ws_url_from_host() {
        assert_eq!(
            ws_url("127.0.0.1:2222", "/ws", false).unwrap(),
            "ws://127.0.0.1:2222/ws"
        );
        assert_eq!(
            ws_url("example.com:443", "shell", true).unwrap(),
            "wss://example.com:443/shell"
        );
    }

    #[test]
    fn test_ws_url_keeps_explicit_path() {
        assert_eq!(
            ws_url("ws://host:80/custom", "/ws", false).unwrap(),
            "ws://host:80/custom"
        );
        assert_eq!(
            ws_url("ws://host:80/", "/ws", false).unwrap(),
            "ws://host:80/ws"
        );
    }

    #[test]
    fn test_ws_url_secure_overrides_scheme() {
        assert_eq!(
            ws_url("ws://host:80", "/ws", true).unwrap(),
            "wss://host:80/ws"
        );
        assert_eq!(
            ws_url("wss://host", "/ws", false).unwrap(),
            "wss://host/ws"
        );
    }

    #[test]
    fn test_ws_url_rejects_empty_host() {
        assert!(ws_url("ws:///ws", "/ws", false).is_err());
    }

    #[tokio::test]
    async fn test_run_over_native_stream() {
        let (local, remote) = duplex(4096);
        let server = tokio::spawn(answer_after_input(NativeStream::new(remote)));

        let mut output = Vec::new();
        run(NativeStream::new(local), "hunter2", &b"hello"[..], &mut output)
            .await
            .unwrap();
        server.await.unwrap();

        assert_eq!(output, b"got: hello");
    }

    #[tokio::test]
    async fn test_run_over_framed_stream() {
        let (a, b) = duplex(64 * 1024);
        let client_ws = WebSocketStream::from_raw_socket(a, Role::Client, None).await;
        let server_ws = WebSocketStream::from_raw_socket(b, Role::Server, None).await;
        let server = tokio::spawn(answer_after_input(FramedStream::<_, Message>::new(
            server_ws,
        )));

        let mut output = Vec::new();
        run(
            FramedStream::<_, Message>::new(client_ws),
            "hunter2",
            &b"over frames"[..],
            &mut output,
        )
        .await
        .unwrap();
        server.await.unwrap();

        assert_eq!(output, b"got: over frames");
    }

    #[tokio::test]
    async fn test_run_rejected() {
        let (local, remote) = duplex(4096);
        let server = tokio::spawn(answer_after_input(NativeStream::new(remote)));

        let mut output = Vec::new();
        let result = run(NativeStream::new(local), "wrong", &b""[..], &mut output).await;
        server.await.unwrap();

        assert!(matches!(result, Err(DepotError::AuthRejected)));
        assert!(output.is_empty());
    }
}
