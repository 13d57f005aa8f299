//! Server configuration.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_rustls::TlsAcceptor;

use crate::cli::ServerArgs;
use crate::pty::{PtySize, ShellCommand, Supervisor};
use crate::server::ws::DEFAULT_WS_PATH;
use crate::server::{tls, ServerState};

/// Which listener front the server runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Raw byte stream over TCP.
    #[default]
    Tcp,
    /// HTTP server with a WebSocket endpoint.
    Httpws,
}

impl FromStr for Transport {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Self::Tcp),
            "httpws" => Ok(Self::Httpws),
            other => Err(ConfigError::InvalidTransport(other.to_string())),
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => f.write_str("tcp"),
            Self::Httpws => f.write_str("httpws"),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listener configuration.
    pub server: ServerSection,
    /// Shared secret.
    pub auth: AuthSection,
    /// Optional TLS material.
    pub tls: TlsSection,
    /// Program run for each session.
    pub shell: ShellCommand,
    /// Terminal size each session starts with.
    pub pty: PtySize,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Listener configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Address to listen on.
    pub listen: String,
    /// Listener front.
    pub proto: Transport,
    /// WebSocket endpoint path for the `httpws` front.
    pub ws_path: String,
    /// Seconds a client may take to send its secret, 0 to wait forever.
    pub handshake_timeout_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:2222".to_string(),
            proto: Transport::Tcp,
            ws_path: DEFAULT_WS_PATH.to_string(),
            handshake_timeout_secs: 30,
        }
    }
}

/// Authentication section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    /// Password every client must present.
    pub password: String,
}

/// TLS section. Both paths or neither.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsSection {
    /// PEM certificate chain.
    pub cert: Option<PathBuf>,
    /// PEM private key.
    pub key: Option<PathBuf>,
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace) or a filter directive.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source (for testing).
    pub fn apply_env_from<F>(&mut self, var: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(listen) = var("DEPOT_LISTEN") {
            self.server.listen = listen;
        }
        if let Some(proto) = var("DEPOT_PROTO") {
            self.server.proto = proto.parse()?;
        }
        if let Some(path) = var("DEPOT_WS_PATH") {
            self.server.ws_path = path;
        }
        if let Some(password) = var("DEPOT_PASSWORD") {
            if !password.is_empty() {
                self.auth.password = password;
            }
        }
        if let Some(shell) = var("DEPOT_SHELL") {
            self.shell = ShellCommand::new(shell);
        }
        if let Some(level) = var("DEPOT_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Some(level) = var("RUST_LOG") {
            self.logging.level = level;
        }
        Ok(())
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &ServerArgs) {
        if let Some(ref listen) = args.listen {
            self.server.listen = listen.clone();
        }
        if let Some(proto) = args.proto {
            self.server.proto = proto;
        }
        if let Some(ref path) = args.ws_path {
            self.server.ws_path = path.clone();
        }
        if let Some(ref password) = args.password {
            self.auth.password = password.clone();
        }
        if let Some(ref cert) = args.tls_cert {
            self.tls.cert = Some(cert.clone());
        }
        if let Some(ref key) = args.tls_key {
            self.tls.key = Some(key.clone());
        }
        if let Some(ref shell) = args.shell {
            self.shell = ShellCommand::new(shell.clone());
        }
        if let Some(size) = args.pty_size {
            self.pty = size;
        }
        if let Some(secs) = args.handshake_timeout {
            self.server.handshake_timeout_secs = secs;
        }
        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Load configuration with full priority chain and validate it.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &ServerArgs) -> Result<Self, ConfigError> {
        let mut config = match args.config {
            Some(ref path) => Config::from_file(path)?,
            None => Config::default(),
        };
        config.apply_env()?;
        config.apply_args(args);
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.password.is_empty() {
            return Err(ConfigError::MissingPassword);
        }
        if self.auth.password.contains(['\n', '\0']) {
            return Err(ConfigError::InvalidPassword);
        }
        if !self.server.ws_path.starts_with('/') {
            return Err(ConfigError::InvalidWsPath(self.server.ws_path.clone()));
        }
        if self.tls.cert.is_some() != self.tls.key.is_some() {
            return Err(ConfigError::IncompleteTls);
        }
        if self.shell.program.is_empty() {
            return Err(ConfigError::MissingShell);
        }
        if self.pty.rows == 0 || self.pty.cols == 0 {
            return Err(ConfigError::InvalidPtySize(self.pty));
        }
        Ok(())
    }

    /// Handshake deadline, `None` when disabled.
    pub fn handshake_timeout(&self) -> Option<Duration> {
        match self.server.handshake_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Build the shared server state.
    pub fn server_state(&self) -> ServerState {
        ServerState::new(
            self.auth.password.clone(),
            Supervisor::new(self.shell.clone()).with_size(self.pty),
        )
        .with_handshake_timeout(self.handshake_timeout())
    }

    /// Load the TLS acceptor if TLS is configured.
    pub fn tls_acceptor(&self) -> crate::Result<Option<TlsAcceptor>> {
        match (&self.tls.cert, &self.tls.key) {
            (Some(cert), Some(key)) => tls::load_acceptor(cert, key).map(Some),
            _ => Ok(None),
        }
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// No password configured.
    MissingPassword,
    /// Password cannot be sent as one handshake line.
    InvalidPassword,
    /// Unknown transport name.
    InvalidTransport(String),
    /// WebSocket path does not start with `/`.
    InvalidWsPath(String),
    /// Only one of certificate and key was given.
    IncompleteTls,
    /// Empty shell program.
    MissingShell,
    /// Zero rows or columns.
    InvalidPtySize(PtySize),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::MissingPassword => write!(f, "a password is required"),
            Self::InvalidPassword => write!(f, "password must not contain newline or NUL"),
            Self::InvalidTransport(t) => {
                write!(f, "invalid transport '{}': expected tcp or httpws", t)
            }
            Self::InvalidWsPath(p) => write!(f, "websocket path must start with '/': {}", p),
            Self::IncompleteTls => write!(f, "TLS needs both a certificate and a key"),
            Self::MissingShell => write!(f, "shell program must not be empty"),
            Self::InvalidPtySize(size) => {
                write!(f, "invalid terminal size {}x{}", size.rows, size.cols)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
