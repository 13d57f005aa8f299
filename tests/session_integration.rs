//! End-to-end session tests over real sockets.
//!
//! Each test starts a listener on an ephemeral port with `/bin/sh` as the
//! shell and drives it as an operator would.

#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use depot::client;
use depot::pty::{ShellCommand, Supervisor};
use depot::server::{self, ServerState};
use depot::{DepotError, SessionGate};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

const SECRET: &str = "hunter2";
const SCRIPT: &[u8] = b"echo depot-$((6*7))\n";
const LIMIT: Duration = Duration::from_secs(15);

fn state() -> ServerState {
    ServerState::new(SECRET, Supervisor::new(ShellCommand::new("/bin/sh")))
        .with_handshake_timeout(Some(Duration::from_secs(5)))
}

async fn start_tcp() -> (String, Arc<SessionGate>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let state = state();
    let gate = state.gate().clone();
    tokio::spawn(server::tcp::serve(listener, state, None));
    (addr, gate)
}

async fn start_ws() -> (String, Arc<SessionGate>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let state = state();
    let gate = state.gate().clone();
    tokio::spawn(async move { server::ws::serve(listener, state, "/ws", None).await });
    (addr, gate)
}

async fn wait_released(gate: &SessionGate) {
    timeout(LIMIT, async {
        while gate.is_held() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("session slot was never released");
}

/// Send the secret and return the raw verdict line.
async fn authenticate(stream: &mut TcpStream, secret: &str) -> Vec<u8> {
    stream
        .write_all(format!("{}\n", secret).as_bytes())
        .await
        .unwrap();
    let mut verdict = vec![0u8; 3];
    stream.read_exact(&mut verdict).await.unwrap();
    verdict
}

// ============================================================================
// Raw TCP
// ============================================================================

#[tokio::test]
async fn test_tcp_session_runs_until_input_ends() {
    let (addr, gate) = start_tcp().await;

    let mut stream = TcpStream::connect(&addr).await.unwrap();
    assert_eq!(authenticate(&mut stream, SECRET).await, b"OK\n");

    stream.write_all(SCRIPT).await.unwrap();
    stream.shutdown().await.unwrap();

    let mut output = Vec::new();
    timeout(LIMIT, stream.read_to_end(&mut output))
        .await
        .expect("shell did not exit after end of input")
        .unwrap();

    assert!(String::from_utf8_lossy(&output).contains("depot-42"));
    wait_released(&gate).await;
}

#[tokio::test]
async fn test_tcp_wrong_secret_is_refused() {
    let (addr, gate) = start_tcp().await;

    let mut stream = TcpStream::connect(&addr).await.unwrap();
    assert_eq!(authenticate(&mut stream, "letmein").await, b"NO\n");

    let mut rest = Vec::new();
    timeout(LIMIT, stream.read_to_end(&mut rest))
        .await
        .unwrap()
        .unwrap();
    assert!(rest.is_empty());
    assert!(!gate.is_held());
}

#[tokio::test]
async fn test_tcp_second_client_refused_while_busy() {
    let (addr, gate) = start_tcp().await;

    let mut first = TcpStream::connect(&addr).await.unwrap();
    assert_eq!(authenticate(&mut first, SECRET).await, b"OK\n");

    let mut second = TcpStream::connect(&addr).await.unwrap();
    assert_eq!(authenticate(&mut second, SECRET).await, b"NO\n");
    let mut rest = Vec::new();
    second.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());

    first.shutdown().await.unwrap();
    let mut output = Vec::new();
    timeout(LIMIT, first.read_to_end(&mut output))
        .await
        .unwrap()
        .unwrap();
    wait_released(&gate).await;

    let mut third = TcpStream::connect(&addr).await.unwrap();
    assert_eq!(authenticate(&mut third, SECRET).await, b"OK\n");
}

#[tokio::test]
async fn test_tcp_client_run() {
    let (addr, gate) = start_tcp().await;

    let stream = client::connect_tcp(&addr).await.unwrap();
    let mut output = Vec::new();
    timeout(LIMIT, client::run(stream, SECRET, SCRIPT, &mut output))
        .await
        .unwrap()
        .unwrap();

    assert!(String::from_utf8_lossy(&output).contains("depot-42"));
    wait_released(&gate).await;
}

// ============================================================================
// WebSocket
// ============================================================================

#[tokio::test]
async fn test_ws_session_runs_until_input_ends() {
    let (addr, gate) = start_ws().await;

    let url = client::ws_url(&addr, "/ws", false).unwrap();
    let stream = client::connect_ws(&url).await.unwrap();
    let mut output = Vec::new();
    timeout(LIMIT, client::run(stream, SECRET, SCRIPT, &mut output))
        .await
        .expect("shell did not exit after end-of-input marker")
        .unwrap();

    assert!(String::from_utf8_lossy(&output).contains("depot-42"));
    wait_released(&gate).await;
}

#[tokio::test]
async fn test_ws_wrong_secret_is_refused() {
    let (addr, gate) = start_ws().await;

    let url = client::ws_url(&addr, "/ws", false).unwrap();
    let stream = client::connect_ws(&url).await.unwrap();
    let mut output = Vec::new();
    let result = timeout(LIMIT, client::run(stream, "letmein", &b""[..], &mut output))
        .await
        .unwrap();

    assert!(matches!(result, Err(DepotError::AuthRejected)));
    assert!(output.is_empty());
    assert!(!gate.is_held());
}

#[tokio::test]
async fn test_ws_upgrade_refused_while_busy() {
    let (addr, gate) = start_ws().await;
    let url = client::ws_url(&addr, "/ws", false).unwrap();

    let holder = client::connect_ws(&url).await.unwrap();
    let (input_tx, input_rx) = tokio::io::duplex(64);
    let session = tokio::spawn(async move {
        let mut output = Vec::new();
        client::run(holder, SECRET, input_rx, &mut output).await
    });

    timeout(LIMIT, async {
        while !gate.is_held() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();

    assert!(client::connect_ws(&url).await.is_err());

    drop(input_tx);
    timeout(LIMIT, session).await.unwrap().unwrap().unwrap();
    wait_released(&gate).await;

    assert!(client::connect_ws(&url).await.is_ok());
}

#[tokio::test]
async fn test_ws_slot_taken_after_upgrade_gets_no() {
    let (addr, gate) = start_ws().await;
    let url = client::ws_url(&addr, "/ws", false).unwrap();

    // The upgrade passes the busy check, then someone else takes the slot.
    let stream = client::connect_ws(&url).await.unwrap();
    let held = gate.try_acquire().expect("slot should be free");

    let mut output = Vec::new();
    let result = timeout(LIMIT, client::run(stream, SECRET, &b""[..], &mut output))
        .await
        .unwrap();
    assert!(matches!(result, Err(DepotError::AuthRejected)));
    assert!(output.is_empty());

    assert!(gate.is_held());
    drop(held);
    assert!(!gate.is_held());
}

#[tokio::test]
async fn test_ws_health_over_socket() {
    let (addr, _gate) = start_ws().await;

    let mut stream = TcpStream::connect(&addr).await.unwrap();
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = Vec::new();
    timeout(LIMIT, stream.read_to_end(&mut response))
        .await
        .unwrap()
        .unwrap();

    let text = String::from_utf8_lossy(&response);
    assert!(text.starts_with("HTTP/1.1 200"));
    assert!(text.ends_with("OK"));
}
