//! TLS material loading and a TLS-terminating listener for the HTTP front.

use std::io::{self, BufReader};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, warn};

use crate::error::DepotError;
use crate::Result;

const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const READY_QUEUE: usize = 64;

/// Build a TLS acceptor from a PEM certificate chain and private key.
pub fn load_acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor> {
    install_crypto_provider();

    let cert_file = std::fs::File::open(cert_path).map_err(|e| {
        DepotError::Tls(format!("reading TLS cert {}: {}", cert_path.display(), e))
    })?;
    let key_file = std::fs::File::open(key_path)
        .map_err(|e| DepotError::Tls(format!("reading TLS key {}: {}", key_path.display(), e)))?;

    let certs: Vec<_> = rustls_pemfile::certs(&mut BufReader::new(cert_file))
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| DepotError::Tls(format!("parsing TLS certs: {}", e)))?;
    if certs.is_empty() {
        return Err(DepotError::Tls(format!(
            "no certificates found in {}",
            cert_path.display()
        )));
    }

    let key = rustls_pemfile::private_key(&mut BufReader::new(key_file))
        .map_err(|e| DepotError::Tls(format!("parsing TLS key: {}", e)))?
        .ok_or_else(|| {
            DepotError::Tls(format!("no private key found in {}", key_path.display()))
        })?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| DepotError::Tls(format!("TLS config error: {}", e)))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Make ring the process-wide rustls provider. Later calls are no-ops.
pub fn install_crypto_provider() {
    let _ = tokio_rustls::rustls::crypto::ring::default_provider().install_default();
}

/// A TCP listener that hands out connections once their TLS handshake is
/// complete.
///
/// Handshakes run in their own tasks, so a client that never speaks does
/// not hold up anyone else. Failed handshakes are logged and dropped.
pub struct TlsListener {
    local_addr: SocketAddr,
    ready: mpsc::Receiver<(TlsStream<TcpStream>, SocketAddr)>,
    accept_task: JoinHandle<()>,
}

impl TlsListener {
    /// Start accepting on `inner`. Must be called within a tokio runtime.
    pub fn new(inner: TcpListener, acceptor: TlsAcceptor) -> io::Result<Self> {
        let local_addr = inner.local_addr()?;
        let (tx, ready) = mpsc::channel(READY_QUEUE);
        let accept_task = tokio::spawn(accept_loop(inner, acceptor, tx));
        Ok(Self {
            local_addr,
            ready,
            accept_task,
        })
    }
}

impl Drop for TlsListener {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn accept_loop(
    inner: TcpListener,
    acceptor: TlsAcceptor,
    ready: mpsc::Sender<(TlsStream<TcpStream>, SocketAddr)>,
) {
    while !ready.is_closed() {
        let (stream, peer) = match inner.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!("accept error: {}", e);
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }
        };

        let acceptor = acceptor.clone();
        let ready = ready.clone();
        tokio::spawn(async move {
            match accept_tls(&acceptor, stream).await {
                Ok(stream) => {
                    if ready.send((stream, peer)).await.is_err() {
                        debug!(%peer, "listener gone, dropping connection");
                    }
                }
                Err(e) => warn!(%peer, "{}", e),
            }
        });
    }
}

/// Run the server side of a TLS handshake, bounded by a deadline.
pub async fn accept_tls(acceptor: &TlsAcceptor, stream: TcpStream) -> Result<TlsStream<TcpStream>> {
    match tokio::time::timeout(TLS_HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(DepotError::Tls(format!("TLS handshake failed: {}", e))),
        Err(_) => Err(DepotError::Tls("TLS handshake timed out".to_string())),
    }
}

impl axum::serve::Listener for TlsListener {
    type Io = TlsStream<TcpStream>;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        match self.ready.recv().await {
            Some(accepted) => accepted,
            // The accept task only stops once this listener is dropped.
            None => std::future::pending().await,
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        Ok(self.local_addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_missing_cert_file() {
        let result = load_acceptor(
            Path::new("/nonexistent/cert.pem"),
            Path::new("/nonexistent/key.pem"),
        );
        assert!(matches!(result, Err(DepotError::Tls(_))));
    }

    #[test]
    fn test_empty_cert_file() {
        let cert = NamedTempFile::new().unwrap();
        let mut key = NamedTempFile::new().unwrap();
        key.write_all(b"not a key").unwrap();

        let err = load_acceptor(cert.path(), key.path()).err().unwrap();
        assert!(err.to_string().contains("no certificates"));
    }
}
