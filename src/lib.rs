//! # depot
//!
//! Single-operator remote shell over TCP or WebSocket.
//!
//! A client connects, sends a password line and, once accepted, owns a
//! shell running under a server-side PTY until either end goes away.
//! Only one session runs at a time.
//!
//! ## Features
//!
//! - **Two transports**: raw TCP with half-close, or WebSocket frames
//! - **One duplex abstraction**: the session logic never sees the transport
//! - **Exclusive sessions**: a second client is refused while one is active
//! - **Optional TLS**: for both listener fronts
//!
//! ## Quick Start
//!
//! ```no_run
//! use depot::{pty::ShellCommand, server, ServerState, Supervisor};
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> depot::Result<()> {
//!     depot::logging::try_init().ok();
//!
//!     let state = ServerState::new("hunter2", Supervisor::new(ShellCommand::new("/bin/sh")));
//!     let listener = TcpListener::bind("127.0.0.1:2222").await?;
//!     server::tcp::serve(listener, state, None).await
//! }
//! ```

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod pty;
pub mod server;
pub mod session;
pub mod stream;

// Re-export commonly used types
pub use config::{Config, Transport};
pub use error::{DepotError, Result};
pub use pty::{PtySize, SessionReport, Supervisor};
pub use server::ServerState;
pub use session::{SessionGate, SessionPermit};
pub use stream::{DuplexStream, FramedStream, NativeStream};
