//! Raw byte-stream front.

use std::time::Duration;

use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{error, info, info_span, warn, Instrument};

use super::tls::accept_tls;
use super::{handle_connection, log_outcome, ServerState};
use crate::stream::NativeStream;
use crate::Result;

/// Accept connections forever, one task per connection.
///
/// With an acceptor, every connection is TLS-wrapped before the handshake.
pub async fn serve(listener: TcpListener, state: ServerState, tls: Option<TlsAcceptor>) -> Result<()> {
    let addr = listener.local_addr()?;
    if tls.is_some() {
        info!(%addr, "listening for raw connections (TLS enabled)");
    } else {
        info!(%addr, "listening for raw connections");
    }

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!("accept error: {}", e);
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            warn!(%peer, "failed to set TCP_NODELAY: {}", e);
        }

        let state = state.clone();
        let tls = tls.clone();
        let span = info_span!("conn", %peer);
        tokio::spawn(
            async move {
                info!("accepted");
                let result = match tls {
                    Some(acceptor) => match accept_tls(&acceptor, stream).await {
                        Ok(stream) => handle_connection(NativeStream::new(stream), state).await,
                        Err(e) => {
                            warn!("{}", e);
                            return;
                        }
                    },
                    None => handle_connection(NativeStream::new(stream), state).await,
                };
                log_outcome(&result);
            }
            .instrument(span),
        );
    }
}
