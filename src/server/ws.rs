//! HTTP front with a WebSocket endpoint.
//!
//! Routes:
//! - `GET /health` - liveness probe
//! - `GET <ws_path>` - WebSocket upgrade into a shell session
//!
//! A request arriving while a session is active is answered `409 Conflict`
//! before the upgrade. The slot is only taken after the handshake, so a
//! client racing past the pre-check still gets `NO` in-band.

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{any, get},
    Router,
};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, Instrument};

use super::tls::TlsListener;
use super::{handle_connection, log_outcome, ServerState};
use crate::error::DepotError;
use crate::stream::FramedStream;
use crate::Result;

/// Default WebSocket endpoint path.
pub const DEFAULT_WS_PATH: &str = "/ws";

/// Build the router with the WebSocket endpoint at `ws_path`.
pub fn router(state: ServerState, ws_path: &str) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(ws_path, any(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
pub async fn health() -> &'static str {
    "OK"
}

/// WebSocket upgrade handler.
///
/// The busy check comes before upgrade validation, so a busy server says so
/// even to a malformed upgrade request.
async fn ws_handler(
    State(state): State<ServerState>,
    ws: std::result::Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if state.gate().is_held() {
        info!("refusing upgrade: a session is already active");
        return (StatusCode::CONFLICT, "busy").into_response();
    }
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    ws.on_upgrade(move |socket| {
        async move {
            info!("upgraded");
            let result = handle_connection(FramedStream::<_, Message>::new(socket), state).await;
            log_outcome(&result);
        }
        .instrument(info_span!("ws"))
    })
}

/// Serve the HTTP front, optionally behind TLS.
pub async fn serve(
    listener: TcpListener,
    state: ServerState,
    ws_path: &str,
    tls: Option<TlsAcceptor>,
) -> Result<()> {
    let addr = listener.local_addr()?;
    let app = router(state, ws_path);

    match tls {
        Some(acceptor) => {
            info!(%addr, path = ws_path, "listening for WebSocket connections (TLS enabled)");
            axum::serve(TlsListener::new(listener, acceptor)?, app)
                .await
                .map_err(|e| DepotError::Io(std::io::Error::other(e.to_string())))
        }
        None => {
            info!(%addr, path = ws_path, "listening for WebSocket connections");
            axum::serve(listener, app)
                .await
                .map_err(|e| DepotError::Io(std::io::Error::other(e.to_string())))
        }
    }
}
