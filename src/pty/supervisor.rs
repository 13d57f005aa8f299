//! Shell session supervision.
//!
//! Two relay directions run per session:
//!
//! - stream → PTY input, in the session task;
//! - PTY output → stream, in its own task.
//!
//! The session is over when the output direction ends. If the client
//! finishes sending first, an EOT byte goes into the PTY so a shell reading
//! its terminal exits the way it would on Ctrl-D, and the output relay is
//! allowed to drain. A relay error skips straight to teardown.

use std::io;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{AsyncPtyReader, AsyncPtyWriter, NativePty, PtySize, ShellCommand, SpawnedShell};
use crate::stream::{DuplexRead, DuplexWrite};
use crate::Result;

/// End-of-transmission control byte (Ctrl-D).
pub const EOT: u8 = 0x04;

const RELAY_BUFFER: usize = 4096;
const CHANNEL_DEPTH: usize = 32;
const EXIT_POLL: Duration = Duration::from_millis(100);
const OUTPUT_DRAIN: Duration = Duration::from_millis(500);

/// Summary of a finished session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionReport {
    /// Shell process ID.
    pub pid: Option<u32>,
    /// Bytes relayed from the client into the PTY.
    pub bytes_in: u64,
    /// Bytes relayed from the PTY to the client.
    pub bytes_out: u64,
    /// Whether the client ended its input cleanly.
    pub input_ended: bool,
    /// Shell exit code, if it was reaped.
    pub exit_code: Option<u32>,
}

/// Spawns shells and relays them with a client stream.
#[derive(Debug, Clone, Default)]
pub struct Supervisor {
    shell: ShellCommand,
    size: PtySize,
}

enum FirstDone<W> {
    Input(io::Result<u64>),
    Output(std::result::Result<(W, io::Result<u64>), tokio::task::JoinError>),
}

impl Supervisor {
    pub fn new(shell: ShellCommand) -> Self {
        Self {
            shell,
            size: PtySize::default(),
        }
    }

    /// Terminal size every session starts with.
    pub fn with_size(mut self, size: PtySize) -> Self {
        self.size = size;
        self
    }

    /// Run one shell session over the given stream halves.
    ///
    /// On spawn failure the stream is closed without relaying anything.
    /// Every other path reclaims the PTY and the child exactly once and
    /// closes the stream before returning, even if a descendant of the
    /// shell still holds the terminal open.
    pub async fn run<R, W>(&self, mut reader: R, mut writer: W) -> Result<SessionReport>
    where
        R: DuplexRead,
        W: DuplexWrite,
    {
        let mut shell = match NativePty::new().spawn(&self.shell, self.size) {
            Ok(shell) => shell,
            Err(e) => {
                warn!("shell spawn failed: {}", e);
                let _ = writer.close().await;
                return Err(e);
            }
        };
        let handles = shell
            .take_reader()
            .and_then(|r| Ok((r, shell.take_writer()?)));
        let (pty_reader, pty_writer) = match handles {
            Ok(handles) => handles,
            Err(e) => {
                warn!("PTY handles unavailable: {}", e);
                let _ = writer.close().await;
                let _ = terminate(shell).await;
                return Err(e);
            }
        };

        let mut report = SessionReport {
            pid: shell.pid(),
            ..SessionReport::default()
        };
        info!(pid = ?report.pid, program = %self.shell.program, "session started");

        let (out_tx, out_rx) = mpsc::channel(CHANNEL_DEPTH);
        let (in_tx, in_rx) = mpsc::channel(CHANNEL_DEPTH);
        let (stop_tx, stop_rx) = oneshot::channel();
        tokio::spawn(
            AsyncPtyReader::new(pty_reader, out_tx)
                .with_buffer_size(RELAY_BUFFER)
                .run(),
        );
        tokio::spawn(AsyncPtyWriter::new(pty_writer, in_rx).run());
        let mut output: JoinHandle<(W, io::Result<u64>)> =
            tokio::spawn(relay_output(out_rx, writer, stop_rx));

        let first = tokio::select! {
            res = relay_input(&mut reader, &in_tx, &mut report.bytes_in) => FirstDone::Input(res),
            res = &mut output => FirstDone::Output(res),
        };

        let output_result = match first {
            FirstDone::Input(Ok(_)) => {
                debug!("client input ended, sending EOT");
                report.input_ended = true;
                if in_tx.send(vec![EOT]).await.is_err() {
                    debug!("PTY input already closed");
                }
                wait_output_or_exit(&mut output, &mut shell).await
            }
            FirstDone::Input(Err(e)) => {
                debug!("input relay failed: {}", e);
                None
            }
            FirstDone::Output(res) => Some(res),
        };
        drop(in_tx);

        report.exit_code = terminate(shell).await;

        // Killing the shell normally ends PTY output with EIO. A descendant
        // that kept the terminal open would hold it forever, so the relay
        // only gets a short grace period before it is told to stop.
        let output_result = match output_result {
            Some(res) => res,
            None => match tokio::time::timeout(OUTPUT_DRAIN, &mut output).await {
                Ok(res) => res,
                Err(_) => {
                    debug!("PTY output still held open, stopping output relay");
                    let _ = stop_tx.send(());
                    (&mut output).await
                }
            },
        };
        match output_result {
            Ok((mut writer, res)) => {
                match res {
                    Ok(n) => report.bytes_out = n,
                    Err(e) => debug!("output relay failed: {}", e),
                }
                let _ = writer.close().await;
            }
            Err(e) => warn!("output relay task failed: {}", e),
        }

        info!(
            pid = ?report.pid,
            exit_code = ?report.exit_code,
            bytes_in = report.bytes_in,
            bytes_out = report.bytes_out,
            "session ended"
        );
        Ok(report)
    }
}

/// Wait for PTY output to end, or for the shell itself to exit.
///
/// `None` means the shell is gone but its terminal is still open.
async fn wait_output_or_exit<W>(
    output: &mut JoinHandle<(W, io::Result<u64>)>,
    shell: &mut SpawnedShell,
) -> Option<std::result::Result<(W, io::Result<u64>), tokio::task::JoinError>> {
    loop {
        tokio::select! {
            res = &mut *output => return Some(res),
            _ = tokio::time::sleep(EXIT_POLL) => {
                if shell.has_exited() {
                    debug!("shell exited, terminal still open");
                    return None;
                }
            }
        }
    }
}

/// Client stream → PTY input. `Ok` means a clean end of input.
async fn relay_input<R: DuplexRead>(
    reader: &mut R,
    tx: &mpsc::Sender<Vec<u8>>,
    total: &mut u64,
) -> io::Result<u64> {
    let mut buf = vec![0u8; RELAY_BUFFER];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(*total);
        }
        tx.send(buf[..n].to_vec())
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "PTY input closed"))?;
        *total += n as u64;
    }
}

/// PTY output → client stream. Hands the writer back for closing.
///
/// Ends when the PTY reader goes away or `stop` fires.
async fn relay_output<W: DuplexWrite>(
    mut rx: mpsc::Receiver<Vec<u8>>,
    mut writer: W,
    mut stop: oneshot::Receiver<()>,
) -> (W, io::Result<u64>) {
    let mut total = 0u64;
    loop {
        let chunk = tokio::select! {
            biased;
            chunk = rx.recv() => chunk,
            _ = &mut stop => None,
        };
        let Some(chunk) = chunk else {
            break;
        };
        if let Err(e) = writer.write_all(&chunk).await {
            return (writer, Err(e));
        }
        total += chunk.len() as u64;
    }
    (writer, Ok(total))
}

async fn terminate(shell: SpawnedShell) -> Option<u32> {
    match tokio::task::spawn_blocking(move || shell.terminate()).await {
        Ok(Ok(status)) => Some(status.exit_code()),
        Ok(Err(e)) => {
            warn!("failed to reap shell: {}", e);
            None
        }
        Err(e) => {
            warn!("teardown task failed: {}", e);
            None
        }
    }
}
