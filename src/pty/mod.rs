//! PTY (Pseudo-Terminal) layer.
//!
//! Spawns the shell on a pseudo-terminal and relays its I/O with a
//! [`DuplexStream`](crate::stream::DuplexStream).

mod async_adapter;
mod native;
pub mod supervisor;

pub use async_adapter::{AsyncPtyReader, AsyncPtyWriter};
pub use native::{default_shell, NativePty, ShellCommand, SpawnedShell};
pub use supervisor::{SessionReport, Supervisor, EOT};

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Size of a PTY in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PtySize {
    /// Number of rows (height).
    pub rows: u16,
    /// Number of columns (width).
    pub cols: u16,
}

impl PtySize {
    /// Create a new PtySize with the given dimensions.
    pub fn new(rows: u16, cols: u16) -> Self {
        Self { rows, cols }
    }
}

/// Parses `ROWSxCOLS`, e.g. `40x132`.
impl FromStr for PtySize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (rows, cols) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected ROWSxCOLS, got '{}'", s))?;
        let rows = rows.trim().parse().map_err(|_| format!("bad row count '{}'", rows))?;
        let cols = cols.trim().parse().map_err(|_| format!("bad column count '{}'", cols))?;
        Ok(Self { rows, cols })
    }
}

impl Default for PtySize {
    fn default() -> Self {
        Self { rows: 24, cols: 80 }
    }
}

impl From<PtySize> for portable_pty::PtySize {
    fn from(size: PtySize) -> Self {
        Self {
            rows: size.rows,
            cols: size.cols,
            pixel_width: 0,
            pixel_height: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pty_size_default() {
        let size = PtySize::default();
        assert_eq!(size.rows, 24);
        assert_eq!(size.cols, 80);
    }

    #[test]
    fn test_pty_size_parse() {
        assert_eq!("40x132".parse::<PtySize>().unwrap(), PtySize::new(40, 132));
        assert_eq!("25X100".parse::<PtySize>().unwrap(), PtySize::new(25, 100));
        assert!("40".parse::<PtySize>().is_err());
        assert!("ax80".parse::<PtySize>().is_err());
    }

    #[test]
    fn test_pty_size_conversion() {
        let native: portable_pty::PtySize = PtySize::new(40, 120).into();
        assert_eq!(native.rows, 40);
        assert_eq!(native.cols, 120);
        assert_eq!(native.pixel_width, 0);
    }
}
