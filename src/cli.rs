//! Command-line interface for `depotd` and `depot`.
//!
//! Uses lexopt for minimal binary size overhead.

use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::config::Transport;
use crate::pty::PtySize;
use crate::server::ws::DEFAULT_WS_PATH;

/// Server command-line arguments. Unset fields fall through to env and file.
#[derive(Debug, Clone, Default)]
pub struct ServerArgs {
    /// Address to listen on.
    pub listen: Option<String>,
    /// Shared secret.
    pub password: Option<String>,
    /// Listener front.
    pub proto: Option<Transport>,
    /// WebSocket endpoint path.
    pub ws_path: Option<String>,
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// PEM certificate chain.
    pub tls_cert: Option<PathBuf>,
    /// PEM private key.
    pub tls_key: Option<PathBuf>,
    /// Shell program.
    pub shell: Option<String>,
    /// Initial terminal size.
    pub pty_size: Option<PtySize>,
    /// Handshake deadline in seconds.
    pub handshake_timeout: Option<u64>,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
}

/// How the client reaches the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClientTransport {
    /// Raw TCP.
    #[default]
    Tcp,
    /// WebSocket over plain HTTP.
    Httpws,
    /// WebSocket over HTTPS.
    Httpswss,
}

impl FromStr for ClientTransport {
    type Err = ArgsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Self::Tcp),
            "httpws" => Ok(Self::Httpws),
            "httpswss" => Ok(Self::Httpswss),
            other => Err(ArgsError::InvalidValue("proto", other.to_string())),
        }
    }
}

/// Client command-line arguments.
#[derive(Debug, Clone)]
pub struct ClientArgs {
    /// Server address.
    pub addr: String,
    /// Shared secret, falls back to `DEPOT_PASSWORD`.
    pub password: Option<String>,
    /// Transport to use.
    pub proto: ClientTransport,
    /// WebSocket endpoint path.
    pub ws_path: String,
    /// Log level for stderr diagnostics.
    pub log_level: Option<String>,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
}

impl Default for ClientArgs {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:2222".to_string(),
            password: None,
            proto: ClientTransport::Tcp,
            ws_path: DEFAULT_WS_PATH.to_string(),
            log_level: None,
            version: false,
            help: false,
        }
    }
}

/// Parse server arguments.
pub fn parse_server_args() -> Result<ServerArgs, ArgsError> {
    parse_server_args_from(std::env::args_os())
}

/// Parse server arguments from an iterator (for testing).
pub fn parse_server_args_from<I>(args: I) -> Result<ServerArgs, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = ServerArgs::default();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('l') | Long("listen") => {
                result.listen = Some(parser.value()?.parse()?);
            }
            Short('p') | Long("password") => {
                result.password = Some(parser.value()?.parse()?);
            }
            Long("proto") => {
                let value: String = parser.value()?.parse()?;
                result.proto = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("proto", value))?,
                );
            }
            Long("ws-path") => {
                result.ws_path = Some(parser.value()?.parse()?);
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Long("tls-cert") => {
                result.tls_cert = Some(parser.value()?.parse()?);
            }
            Long("tls-key") => {
                result.tls_key = Some(parser.value()?.parse()?);
            }
            Long("shell") => {
                result.shell = Some(parser.value()?.parse()?);
            }
            Long("pty-size") => {
                let value: String = parser.value()?.parse()?;
                result.pty_size = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("pty-size", value))?,
                );
            }
            Long("handshake-timeout") => {
                let value: String = parser.value()?.parse()?;
                result.handshake_timeout = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("handshake-timeout", value))?,
                );
            }
            Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Value(val) => {
                return Err(ArgsError::UnexpectedArgument(val.to_string_lossy().into()));
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    Ok(result)
}

/// Parse client arguments.
pub fn parse_client_args() -> Result<ClientArgs, ArgsError> {
    parse_client_args_from(std::env::args_os())
}

/// Parse client arguments from an iterator (for testing).
pub fn parse_client_args_from<I>(args: I) -> Result<ClientArgs, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = ClientArgs::default();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('a') | Long("addr") => {
                result.addr = parser.value()?.parse()?;
            }
            Short('p') | Long("password") => {
                result.password = Some(parser.value()?.parse()?);
            }
            Long("proto") => {
                let value: String = parser.value()?.parse()?;
                result.proto = value.parse()?;
            }
            Long("ws-path") => {
                result.ws_path = parser.value()?.parse()?;
            }
            Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Value(val) => {
                return Err(ArgsError::UnexpectedArgument(val.to_string_lossy().into()));
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    Ok(result)
}

impl ClientArgs {
    /// The secret from `--password`, else `DEPOT_PASSWORD`.
    pub fn resolve_password(&self) -> Result<String, ArgsError> {
        self.resolve_password_from(|key| std::env::var(key).ok())
    }

    /// Resolve the secret from an arbitrary variable source (for testing).
    pub fn resolve_password_from<F>(&self, var: F) -> Result<String, ArgsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.password
            .clone()
            .or_else(|| var("DEPOT_PASSWORD"))
            .filter(|p| !p.is_empty())
            .ok_or(ArgsError::MissingValue("password"))
    }
}

/// Print server help message.
pub fn print_server_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"depotd {version}
Single-session remote shell server

USAGE:
    depotd [OPTIONS]

OPTIONS:
    -l, --listen <ADDR>           Address to listen on [default: 0.0.0.0:2222]
    -p, --password <SECRET>       Password clients must present
        --proto <PROTO>           Listener front: tcp or httpws [default: tcp]
        --ws-path <PATH>          WebSocket endpoint for httpws [default: /ws]
    -c, --config <FILE>           Path to configuration file (JSON)
        --tls-cert <FILE>         PEM certificate chain
        --tls-key <FILE>          PEM private key
        --shell <PROGRAM>         Shell to run [default: $SHELL or /bin/sh]
        --pty-size <ROWSxCOLS>    Initial terminal size [default: 24x80]
        --handshake-timeout <S>   Seconds allowed for the password line, 0 = none [default: 30]
        --log-level <LVL>         Log level (error, warn, info, debug, trace)
    -h, --help                    Print help
    -V, --version                 Print version

ENVIRONMENT VARIABLES:
    DEPOT_LISTEN                  Listen address (overrides config)
    DEPOT_PASSWORD                Password (overrides config)
    DEPOT_PROTO                   Listener front (overrides config)
    DEPOT_WS_PATH                 WebSocket path (overrides config)
    DEPOT_SHELL                   Shell program (overrides config)
    DEPOT_LOG_LEVEL               Log level (overrides config)
    RUST_LOG                      Alternative log level setting

EXAMPLES:
    # Raw TCP on the default port
    depotd -p hunter2

    # WebSocket front with TLS
    depotd -p hunter2 --proto httpws --tls-cert cert.pem --tls-key key.pem
"#
    );
}

/// Print client help message.
pub fn print_client_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"depot {version}
Client for a depotd remote shell

USAGE:
    depot [OPTIONS]

OPTIONS:
    -a, --addr <HOST:PORT>        Server address [default: 127.0.0.1:2222]
    -p, --password <SECRET>       Password (or DEPOT_PASSWORD)
        --proto <PROTO>           tcp, httpws or httpswss [default: tcp]
        --ws-path <PATH>          WebSocket endpoint [default: /ws]
        --log-level <LVL>         Diagnostics on stderr [default: warn]
    -h, --help                    Print help
    -V, --version                 Print version
"#
    );
}

/// Print version.
pub fn print_version(name: &str) {
    println!("{} {}", name, env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug)]
pub enum ArgsError {
    /// Lexopt parsing error.
    Lexopt(lexopt::Error),
    /// Invalid argument value.
    InvalidValue(&'static str, String),
    /// Required value not given.
    MissingValue(&'static str),
    /// Unexpected positional argument.
    UnexpectedArgument(String),
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lexopt(e) => write!(f, "{}", e),
            Self::InvalidValue(name, value) => {
                write!(f, "invalid value for --{}: '{}'", name, value)
            }
            Self::MissingValue(name) => write!(f, "missing --{}", name),
            Self::UnexpectedArgument(arg) => {
                write!(f, "unexpected argument: '{}'", arg)
            }
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<lexopt::Error> for ArgsError {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}
