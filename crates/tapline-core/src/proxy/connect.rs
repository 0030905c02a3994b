//! Outbound connections to relay targets.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::error::ConnectError;

/// Open a TCP connection to `addr:port`.
///
/// Without `connect_timeout` the operating system decides when to give up.
pub async fn open_target(
    addr: Ipv4Addr,
    port: u16,
    connect_timeout: Option<Duration>,
) -> Result<TcpStream, ConnectError> {
    let target = SocketAddr::from((addr, port));

    let connected = match connect_timeout {
        Some(limit) => match timeout(limit, TcpStream::connect(target)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Connection to {} timed out after {:?}", target, limit);
                return Err(ConnectError::TimedOut);
            }
        },
        None => TcpStream::connect(target).await,
    };

    match connected {
        Ok(stream) => {
            info!("Successfully connected with {}", target);
            Ok(stream)
        }
        Err(e) => {
            warn!("Failed to connect to {}: {}", target, e);
            Err(ConnectError::from(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_open_target_success() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let stream = open_target(Ipv4Addr::LOCALHOST, port, None).await.unwrap();
        assert_eq!(stream.peer_addr().unwrap().port(), port);
    }

    #[tokio::test]
    async fn test_open_target_refused() {
        // Bind then drop to get a port that is very likely closed.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let err = open_target(Ipv4Addr::LOCALHOST, port, Some(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert_eq!(err, ConnectError::Refused);
    }

    #[tokio::test]
    async fn test_open_target_timeout() {
        // Non-routable address, the connect attempt hangs.
        let err = open_target(
            Ipv4Addr::new(10, 255, 255, 1),
            12345,
            Some(Duration::from_millis(100)),
        )
        .await
        .unwrap_err();

        assert!(
            matches!(err, ConnectError::TimedOut | ConnectError::Other(_)),
            "unexpected {:?}",
            err
        );
    }
}
