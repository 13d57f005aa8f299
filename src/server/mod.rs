//! Listener fronts and the per-connection flow they share.
//!
//! Every accepted connection, whatever its transport, goes through
//! [`handle_connection`]: handshake, admission, then the shell relay.
//!
//! ```no_run
//! use depot::pty::{ShellCommand, Supervisor};
//! use depot::server::{tcp, ServerState};
//!
//! #[tokio::main]
//! async fn main() -> depot::Result<()> {
//!     let state = ServerState::new("hunter2", Supervisor::new(ShellCommand::default()));
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:2222").await?;
//!     tcp::serve(listener, state, None).await
//! }
//! ```

pub mod tcp;
pub mod tls;
pub mod ws;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::DepotError;
use crate::protocol::{read_secret, secret_matches, send_verdict, Verdict};
use crate::pty::{SessionReport, Supervisor};
use crate::session::SessionGate;
use crate::stream::{DuplexStream, DuplexWrite};
use crate::Result;

/// State shared by every connection task.
#[derive(Clone)]
pub struct ServerState {
    secret: Arc<str>,
    gate: Arc<SessionGate>,
    supervisor: Arc<Supervisor>,
    handshake_timeout: Option<Duration>,
}

impl ServerState {
    pub fn new(secret: impl Into<String>, supervisor: Supervisor) -> Self {
        Self {
            secret: Arc::from(secret.into()),
            gate: Arc::new(SessionGate::new()),
            supervisor: Arc::new(supervisor),
            handshake_timeout: None,
        }
    }

    /// Bound the time a client may take to present its secret.
    pub fn with_handshake_timeout(mut self, limit: Option<Duration>) -> Self {
        self.handshake_timeout = limit;
        self
    }

    pub fn gate(&self) -> &Arc<SessionGate> {
        &self.gate
    }
}

/// Run the full server-side flow over one accepted connection.
///
/// The secret is checked before admission, so a wrong secret never touches
/// the slot. A busy server answers `NO` like a wrong secret does.
pub async fn handle_connection<D: DuplexStream>(
    stream: D,
    state: ServerState,
) -> Result<SessionReport> {
    let (mut reader, mut writer) = stream.into_split();

    let presented = match state.handshake_timeout {
        Some(limit) => tokio::time::timeout(limit, read_secret(&mut reader))
            .await
            .unwrap_or(Err(DepotError::Timeout)),
        None => read_secret(&mut reader).await,
    };
    let presented = match presented {
        Ok(line) => line,
        Err(e) => {
            debug!("handshake failed: {}", e);
            reject(writer).await;
            return Err(e);
        }
    };
    if !secret_matches(&presented, state.secret.as_bytes()) {
        warn!("authentication failed");
        reject(writer).await;
        return Err(DepotError::AuthRejected);
    }

    let Some(permit) = state.gate.try_acquire() else {
        info!("rejecting authenticated client: a session is already active");
        reject(writer).await;
        return Err(DepotError::SessionBusy);
    };

    send_verdict(&mut writer, Verdict::Accepted).await?;
    let report = state.supervisor.run(reader, writer).await;
    drop(permit);
    report
}

async fn reject<W: DuplexWrite>(mut writer: W) {
    let _ = send_verdict(&mut writer, Verdict::Rejected).await;
    let _ = writer.close().await;
}

/// Log how a connection ended.
pub(crate) fn log_outcome(result: &Result<SessionReport>) {
    match result {
        Ok(_) => debug!("connection closed"),
        Err(DepotError::AuthRejected) | Err(DepotError::SessionBusy) => {}
        Err(e) => info!("connection ended: {}", e),
    }
}
