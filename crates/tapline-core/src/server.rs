//! Listener and accept loop.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpSocket};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::Config;
use crate::error::{describe, Error, Result};
use crate::proxy::ReachabilityProbe;
use crate::session::Session;

/// Pause after an accept failure that is not tied to one connection.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// How an accept error is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcceptFailure {
    /// Only the pending connection is affected; keep accepting.
    Connection,
    /// Likely resource exhaustion; back off, then keep accepting.
    Transient,
    /// The listener itself is unusable.
    Fatal,
}

fn classify_accept_error(err: &io::Error) -> AcceptFailure {
    match err.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::Interrupted
        | io::ErrorKind::WouldBlock => AcceptFailure::Connection,
        io::ErrorKind::InvalidInput => AcceptFailure::Fatal,
        _ => AcceptFailure::Transient,
    }
}

/// Relay server: one task per accepted connection.
pub struct RelayServer<P> {
    listener: TcpListener,
    config: Arc<Config>,
    probe: Arc<P>,
}

impl<P: ReachabilityProbe> RelayServer<P> {
    /// Bind the listener with the configured backlog.
    pub async fn bind(config: Arc<Config>, probe: P) -> Result<Self> {
        info!("Initializing relay server...");

        let addr = config.server.bind_addr()?;
        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr).map_err(|e| {
            error!("Failed to bind {}: {}", addr, describe(e.kind()));
            Error::Bind(e)
        })?;
        let listener = socket.listen(config.server.backlog).map_err(|e| {
            error!("Failed to listen on {}: {}", addr, describe(e.kind()));
            Error::Listen(e)
        })?;

        info!(
            "Relay server listening on {} (backlog {})",
            listener.local_addr()?,
            config.server.backlog
        );

        Ok(Self {
            listener,
            config,
            probe: Arc::new(probe),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the listener fails for good.
    pub async fn run(self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, client_addr)) => {
                    info!("Proxy client {}", client_addr);

                    let session = Session::new(
                        stream,
                        client_addr,
                        Arc::clone(&self.config),
                        Arc::clone(&self.probe),
                    );
                    let span = info_span!("session", id = %session.info().id, peer = %client_addr);

                    tokio::spawn(
                        async move {
                            if let Err(e) = session.run().await {
                                debug!("Connection from {} error: {}", client_addr, e);
                            }
                        }
                        .instrument(span),
                    );
                }
                Err(e) => match classify_accept_error(&e) {
                    AcceptFailure::Connection => {
                        debug!("Dropped pending connection: {}", e);
                    }
                    AcceptFailure::Transient => {
                        warn!("Failed to accept connection: {}", e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                    AcceptFailure::Fatal => {
                        error!("Listener failed: {}", e);
                        return Err(Error::Accept(e));
                    }
                },
            }
        }
    }
}
