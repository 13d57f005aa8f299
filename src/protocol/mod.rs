//! Wire protocol shared by both transports.

pub mod handshake;

pub use handshake::{
    client_handshake, read_secret, secret_matches, send_verdict, Verdict, MAX_SECRET_LINE,
};
