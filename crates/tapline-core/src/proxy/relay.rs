//! TCP relay implementation.
//!
//! Client to target runs inline in the session task, target to client in a
//! spawned worker. Each direction owns one read half and one write half, so
//! the sockets themselves are never shared. What is shared is the
//! [`RelayLink`]: the record of which direction ended the relay, guarded by a
//! mutex that is never held across I/O, and a cancellation token that stops
//! the other direction. The relay is torn down as a unit: whichever side
//! stops first takes the other one with it.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Bytes moved per read. Not a message boundary.
pub const RELAY_CHUNK_SIZE: usize = 1024;

/// One direction of the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToTarget,
    TargetToClient,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ClientToTarget => f.write_str("client->target"),
            Direction::TargetToClient => f.write_str("target->client"),
        }
    }
}

/// Why a direction stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Closure {
    /// The source reached end of stream.
    PeerClosed,
    /// Reading the source failed.
    ReadFailed,
    /// Writing the destination failed.
    WriteFailed,
    /// The other direction ended the relay.
    Cancelled,
}

/// The direction that ended the relay, and why.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Termination {
    pub direction: Direction,
    pub closure: Closure,
}

/// State shared by the two directions of one relay.
#[derive(Debug, Default)]
pub struct RelayLink {
    cancel: CancellationToken,
    termination: Mutex<Option<Termination>>,
}

impl RelayLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `direction` stopped and signal the other one.
    ///
    /// Only the first call is recorded; returns whether this call was it.
    pub fn terminate(&self, direction: Direction, closure: Closure) -> bool {
        {
            let mut termination = self
                .termination
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if termination.is_some() {
                return false;
            }
            *termination = Some(Termination { direction, closure });
        }

        self.cancel.cancel();
        true
    }

    /// The first recorded termination, if any.
    pub fn termination(&self) -> Option<Termination> {
        *self
            .termination
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_terminated(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Outcome of a finished relay.
#[derive(Debug, Clone, Copy)]
pub struct RelayReport {
    /// Bytes forwarded from client to target.
    pub bytes_sent: u64,
    /// Bytes forwarded from target to client.
    pub bytes_received: u64,
    /// What ended the relay.
    pub termination: Option<Termination>,
}

/// Relay data between client and target until either side stops.
///
/// Both sockets are closed when this returns.
pub async fn relay_tcp(client: TcpStream, target: TcpStream) -> RelayReport {
    let (client_read, client_write) = client.into_split();
    let (target_read, target_write) = target.into_split();

    let link = Arc::new(RelayLink::new());

    let worker_link = Arc::clone(&link);
    let worker = tokio::spawn(async move {
        // Also fires if the worker unwinds.
        let _guard = worker_link.token().clone().drop_guard();
        pump(target_read, client_write, Direction::TargetToClient, &worker_link).await
    });

    let bytes_sent = pump(client_read, target_write, Direction::ClientToTarget, &link).await;

    let bytes_received = match worker.await {
        Ok(n) => n,
        Err(e) => {
            warn!("Relay worker failed: {}", e);
            0
        }
    };

    let report = RelayReport {
        bytes_sent,
        bytes_received,
        termination: link.termination(),
    };

    debug!(
        "Relay complete: sent={}, received={}, ended by {:?}",
        report.bytes_sent, report.bytes_received, report.termination
    );

    report
}

/// Forward one direction until it stops or the link is cancelled.
///
/// Returns the number of bytes forwarded.
pub async fn pump<R, W>(mut reader: R, mut writer: W, direction: Direction, link: &RelayLink) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let cancel = link.token();
    let mut buf = [0u8; RELAY_CHUNK_SIZE];
    let mut total: u64 = 0;

    let closure = loop {
        let n = tokio::select! {
            biased;
            _ = cancel.cancelled() => break Closure::Cancelled,
            read = reader.read(&mut buf) => match read {
                Ok(0) => break Closure::PeerClosed,
                Ok(n) => n,
                Err(e) => {
                    debug!("{} read failed: {}", direction, e);
                    break Closure::ReadFailed;
                }
            },
        };

        let written = tokio::select! {
            biased;
            _ = cancel.cancelled() => break Closure::Cancelled,
            written = writer.write_all(&buf[..n]) => written,
        };

        if let Err(e) = written {
            debug!("{} write failed: {}", direction, e);
            break Closure::WriteFailed;
        }

        total += n as u64;
    };

    if closure != Closure::Cancelled {
        link.terminate(direction, closure);
    }

    let _ = writer.shutdown().await;

    debug!("{} stopped ({:?}) after {} bytes", direction, closure, total);
    total
}
