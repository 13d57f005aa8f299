//! Error types for depot.

use thiserror::Error;

/// Main error type for depot operations.
#[derive(Error, Debug)]
pub enum DepotError {
    /// The server answered the handshake with anything other than `OK`.
    #[error("authentication failed")]
    AuthRejected,

    /// The handshake line was not a valid secret line.
    #[error("malformed handshake: {0}")]
    MalformedHandshake(&'static str),

    /// Another session already holds the admission slot.
    #[error("session slot is busy")]
    SessionBusy,

    /// PTY allocation or shell spawn failed.
    #[error("PTY error: {0}")]
    Pty(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A peer did not finish a bounded step in time.
    #[error("operation timed out")]
    Timeout,

    /// WebSocket transport error.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// TLS setup error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Address could not be parsed or resolved.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Configuration is incomplete or inconsistent.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for DepotError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(e.to_string())
    }
}

/// Convenience Result type for depot operations.
pub type Result<T> = std::result::Result<T, DepotError>;
