//! Password handshake.
//!
//! The client sends `<secret>\n`; the server answers with exactly `OK\n` or
//! `NO\n`. One line, one verdict, no retries. A `NO` is also what a busy
//! server sends, so the client cannot tell the two apart.

use subtle::ConstantTimeEq;
use tracing::debug;

use crate::error::DepotError;
use crate::stream::{read_line, DuplexRead, DuplexWrite};
use crate::Result;

/// Upper bound on a secret line, newline included.
pub const MAX_SECRET_LINE: usize = 4096;

const STATUS_OK: &[u8] = b"OK\n";
const STATUS_FAIL: &[u8] = b"NO\n";

/// The server's answer to a handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected,
}

impl Verdict {
    /// Wire token for this verdict.
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            Self::Accepted => STATUS_OK,
            Self::Rejected => STATUS_FAIL,
        }
    }
}

/// Read the client's secret line, without its trailing newline.
///
/// Consumes nothing past the newline, so bytes the client pipelines after
/// the secret reach the shell untouched.
pub async fn read_secret<R: DuplexRead>(reader: &mut R) -> Result<Vec<u8>> {
    let mut line = match read_line(reader, MAX_SECRET_LINE).await {
        Ok(Some(line)) => line,
        Ok(None) => return Err(DepotError::MalformedHandshake("stream ended before newline")),
        Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
            return Err(DepotError::MalformedHandshake("secret line too long"))
        }
        Err(e) => return Err(e.into()),
    };
    line.pop();
    if line.contains(&0) {
        return Err(DepotError::MalformedHandshake("embedded NUL byte"));
    }
    Ok(line)
}

/// Compare a presented secret with the expected one.
///
/// Runs in time independent of where the first mismatch is.
pub fn secret_matches(presented: &[u8], expected: &[u8]) -> bool {
    presented.len() == expected.len() && bool::from(presented.ct_eq(expected))
}

/// Send the verdict token.
pub async fn send_verdict<W: DuplexWrite>(writer: &mut W, verdict: Verdict) -> Result<()> {
    writer.write_all(verdict.as_bytes()).await?;
    Ok(())
}

/// Client side: present `secret` and wait for the verdict.
///
/// Anything other than exactly `OK\n`, a read failure included, is
/// [`DepotError::AuthRejected`].
pub async fn client_handshake<R, W>(reader: &mut R, writer: &mut W, secret: &str) -> Result<()>
where
    R: DuplexRead,
    W: DuplexWrite,
{
    if secret.contains(['\n', '\0']) {
        return Err(DepotError::Config(
            "password must not contain newline or NUL".into(),
        ));
    }

    let mut line = Vec::with_capacity(secret.len() + 1);
    line.extend_from_slice(secret.as_bytes());
    line.push(b'\n');
    writer.write_all(&line).await?;

    match read_line(reader, STATUS_OK.len()).await {
        Ok(Some(reply)) if reply == STATUS_OK => Ok(()),
        Ok(reply) => {
            debug!(?reply, "server refused handshake");
            Err(DepotError::AuthRejected)
        }
        Err(e) => {
            debug!("handshake reply unreadable: {}", e);
            Err(DepotError::AuthRejected)
        }
    }
}
