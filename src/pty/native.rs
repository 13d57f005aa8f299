//! Native PTY implementation using portable-pty.

use portable_pty::{native_pty_system, CommandBuilder};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use tracing::debug;

use super::PtySize;
use crate::error::DepotError;
use crate::Result;

/// Get the default shell for the current platform.
pub fn default_shell() -> String {
    #[cfg(unix)]
    {
        std::env::var("SHELL")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "/bin/sh".to_string())
    }
    #[cfg(windows)]
    {
        "powershell.exe".to_string()
    }
}

/// The program run for each session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellCommand {
    /// Program path or name.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<String>,
}

impl ShellCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    fn to_builder(&self) -> CommandBuilder {
        let mut cmd = CommandBuilder::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

impl Default for ShellCommand {
    fn default() -> Self {
        Self::new(default_shell())
    }
}

/// Wrapper around the native PTY system.
pub struct NativePty {
    pty_system: Box<dyn portable_pty::PtySystem + Send>,
}

impl NativePty {
    /// Create a new NativePty instance.
    pub fn new() -> Self {
        Self {
            pty_system: native_pty_system(),
        }
    }

    /// Spawn `command` attached to a new PTY of the given size.
    pub fn spawn(&self, command: &ShellCommand, size: PtySize) -> Result<SpawnedShell> {
        let pair = self
            .pty_system
            .openpty(size.into())
            .map_err(|e| DepotError::Pty(e.to_string()))?;

        // The slave end is dropped when `pair.slave` goes out of scope, so
        // the master sees EIO once the child and its descendants exit.
        let child = pair
            .slave
            .spawn_command(command.to_builder())
            .map_err(|e| DepotError::Pty(e.to_string()))?;

        debug!(program = %command.program, pid = ?child.process_id(), "spawned shell");

        Ok(SpawnedShell {
            master: pair.master,
            child,
        })
    }
}

impl Default for NativePty {
    fn default() -> Self {
        Self::new()
    }
}

/// A spawned shell process with its PTY master.
pub struct SpawnedShell {
    master: Box<dyn portable_pty::MasterPty + Send>,
    child: Box<dyn portable_pty::Child + Send + Sync>,
}

impl SpawnedShell {
    /// Process ID of the shell, if the platform reports one.
    pub fn pid(&self) -> Option<u32> {
        self.child.process_id()
    }

    /// Take the writer (can only be called once).
    pub fn take_writer(&mut self) -> Result<Box<dyn Write + Send>> {
        self.master
            .take_writer()
            .map_err(|e| DepotError::Pty(e.to_string()))
    }

    /// Clone a reader for the PTY output.
    pub fn take_reader(&mut self) -> Result<Box<dyn Read + Send>> {
        self.master
            .try_clone_reader()
            .map_err(|e| DepotError::Pty(e.to_string()))
    }

    /// Whether the shell process has exited. Never blocks.
    pub fn has_exited(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(status) => status.is_some(),
            Err(e) => {
                debug!("try_wait failed: {}", e);
                true
            }
        }
    }

    /// Close the PTY, kill the child if it is still running and reap it.
    ///
    /// Consumes the shell, so it runs at most once. Blocking.
    pub fn terminate(self) -> std::io::Result<portable_pty::ExitStatus> {
        let Self { master, mut child } = self;
        drop(master);

        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        debug!(pid = ?child.process_id(), "killing shell");
        if let Err(e) = child.kill() {
            // Lost the race with a natural exit; the wait below still reaps.
            debug!("kill failed: {}", e);
        }
        child.wait()
    }
}
