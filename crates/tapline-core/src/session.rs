//! Per-connection session: handshake, command dispatch and relay.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info};
use uuid::Uuid;

use crate::command::{Command, CONNECT_OK, TAP_OK};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::proxy::{fetch, handshake, open_target, relay_tcp, ReachabilityProbe};
use crate::resolve::resolve_host;

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the client hello.
    Handshake,
    /// Waiting for or executing the command line.
    Command,
    /// Relaying bytes to a target.
    Relaying,
    /// Running a reachability probe.
    Probing,
    /// Connection closed.
    Closed,
}

/// Information about a single session.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Unique session identifier.
    pub id: Uuid,

    /// Client address.
    pub client_addr: SocketAddr,

    /// Command name, once decoded.
    pub command: Option<&'static str>,

    /// Target as requested by the client, once connected.
    pub target: Option<String>,

    /// Current state.
    pub state: SessionState,

    /// When the connection was accepted.
    pub started_at: DateTime<Utc>,

    /// When the connection was closed (if applicable).
    pub closed_at: Option<DateTime<Utc>>,

    /// Bytes relayed to the target.
    pub bytes_sent: u64,

    /// Bytes relayed back to the client.
    pub bytes_received: u64,
}

impl SessionInfo {
    pub fn new(client_addr: SocketAddr) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_addr,
            command: None,
            target: None,
            state: SessionState::Handshake,
            started_at: Utc::now(),
            closed_at: None,
            bytes_sent: 0,
            bytes_received: 0,
        }
    }

    /// Mark the session as closed.
    pub fn set_closed(&mut self) {
        self.state = SessionState::Closed;
        self.closed_at = Some(Utc::now());
    }

    /// Session duration in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        let end = self.closed_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds()
    }
}

/// What happens after the command was handled.
enum Next {
    /// Relay between the client and this target.
    Relay(TcpStream),
    /// Nothing more to do; close the client.
    Close,
}

/// One accepted client connection.
pub struct Session<P> {
    info: SessionInfo,
    client: TcpStream,
    config: Arc<Config>,
    probe: Arc<P>,
}

impl<P: ReachabilityProbe> Session<P> {
    pub fn new(client: TcpStream, client_addr: SocketAddr, config: Arc<Config>, probe: Arc<P>) -> Self {
        Self {
            info: SessionInfo::new(client_addr),
            client,
            config,
            probe,
        }
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    /// Drive the session to completion.
    ///
    /// Errors before the relay starts have already been reported to the
    /// client when this returns them.
    pub async fn run(mut self) -> Result<()> {
        let result = match self.prepare().await {
            Ok(Next::Relay(target)) => {
                self.relay(target).await;
                return Ok(());
            }
            Ok(Next::Close) => Ok(()),
            Err(e) => {
                self.reject(&e).await;
                Err(e)
            }
        };

        self.info.set_closed();
        debug!(
            "Session {} closed after {} ms",
            self.info.id,
            self.info.duration_ms()
        );
        result
    }

    async fn prepare(&mut self) -> Result<Next> {
        let session = &self.config.session;

        handshake::perform(&mut self.client, session.handshake_timeout()).await?;
        self.info.state = SessionState::Command;

        let control = handshake::read_command(&mut self.client, session.command_timeout()).await?;
        let command = Command::parse(&control.line)?;
        self.info.command = Some(command.name());
        debug!("Client {} sent {}", self.info.client_addr, command.name());

        match command {
            Command::Connect { host, port } => {
                let addr = resolve_host(&host, self.config.resolver.selection).await?;
                let mut target = open_target(addr, port, session.connect_timeout()).await?;
                self.info.target = Some(format!("{}:{}", host, port));

                if !control.trailing.is_empty() {
                    target.write_all(&control.trailing).await?;
                    self.info.bytes_sent += control.trailing.len() as u64;
                }

                self.client.write_all(CONNECT_OK).await?;
                Ok(Next::Relay(target))
            }
            Command::Tap { host } => {
                let addr = resolve_host(&host, self.config.resolver.selection).await?;
                self.info.state = SessionState::Probing;
                self.probe.probe(addr).await?;

                info!("TAP {} ({}) reachable", host, addr);
                self.client.write_all(TAP_OK).await?;
                Ok(Next::Close)
            }
            Command::Curl { website, method } => {
                fetch(&website, &method).await?;
                Ok(Next::Close)
            }
            Command::BadCommand => Err(Error::BadCommand),
        }
    }

    async fn relay(mut self, target: TcpStream) {
        self.info.state = SessionState::Relaying;

        let report = relay_tcp(self.client, target).await;
        self.info.bytes_sent += report.bytes_sent;
        self.info.bytes_received += report.bytes_received;
        self.info.set_closed();

        info!(
            "CONNECT closed: {} -> {} (sent: {}, recv: {}, {} ms)",
            self.info.client_addr,
            self.info.target.as_deref().unwrap_or("?"),
            self.info.bytes_sent,
            self.info.bytes_received,
            self.info.duration_ms()
        );
    }

    /// Send the error reply; the connection closes when the session drops.
    async fn reject(&mut self, err: &Error) {
        debug!("Rejecting {}: {}", self.info.client_addr, err);

        let reply = err.reply();
        if self.client.write_all(reply.as_bytes()).await.is_ok() {
            let _ = self.client.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_info_lifecycle() {
        let addr: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        let mut info = SessionInfo::new(addr);

        assert_eq!(info.state, SessionState::Handshake);
        assert!(info.closed_at.is_none());
        assert!(info.target.is_none());

        info.set_closed();
        assert_eq!(info.state, SessionState::Closed);
        assert!(info.closed_at.is_some());
        assert!(info.duration_ms() >= 0);
    }

    #[test]
    fn test_session_ids_are_unique() {
        let addr: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        assert_ne!(SessionInfo::new(addr).id, SessionInfo::new(addr).id);
    }
}
