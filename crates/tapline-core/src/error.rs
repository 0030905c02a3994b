//! Error types for the tapline relay.

use std::io;

use thiserror::Error;

/// Result type alias for tapline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while serving a session.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error during network operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Binding the listening socket failed.
    #[error("Failed to bind the socket: {0}")]
    Bind(#[source] io::Error),

    /// Putting the socket into listening mode failed.
    #[error("Failed to start listening for connections: {0}")]
    Listen(#[source] io::Error),

    /// The listener can no longer accept connections.
    #[error("Failed to accept connection: {0}")]
    Accept(#[source] io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The client sent nothing within the handshake window.
    #[error("Timed out waiting for the client hello")]
    HandshakeTimeout,

    /// The client sent something other than the expected hello.
    #[error("Client sent an invalid hello message")]
    HandshakeMismatch,

    /// The client sent nothing within the command window.
    #[error("Timed out waiting for a command")]
    CommandTimeout,

    /// Malformed CONNECT line.
    #[error("Invalid CONNECT request: {0}")]
    InvalidConnect(String),

    /// Malformed TAP line.
    #[error("Invalid TAP request: {0}")]
    InvalidTap(String),

    /// Malformed CURL line.
    #[error("Invalid CURL request: {0}")]
    InvalidCurl(String),

    /// The line did not contain any known command.
    #[error("Client gave bad commands!")]
    BadCommand,

    /// Host name resolution produced no usable address.
    #[error("Failed to resolve hostname to IP: {0}")]
    ResolutionFailed(String),

    /// Outbound connection failed.
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// Reachability probe failed.
    #[error(transparent)]
    Probe(#[from] ProbeError),

    /// The command exists but has no implementation.
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),
}

/// Reasons an outbound connection could not be opened.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error("Failed to connect! Permission denied!")]
    PermissionDenied,

    #[error("Failed to connect! Connection refused!")]
    Refused,

    #[error("Failed to connect! Connection timed out!")]
    TimedOut,

    #[error("Failed to connect! Error code: {0}")]
    Other(i32),
}

impl From<io::Error> for ConnectError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => ConnectError::PermissionDenied,
            io::ErrorKind::ConnectionRefused => ConnectError::Refused,
            io::ErrorKind::TimedOut => ConnectError::TimedOut,
            _ => ConnectError::Other(err.raw_os_error().unwrap_or(0)),
        }
    }
}

/// Failed reachability probe outcomes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("TAP 101 Host Unreachable!")]
    HostUnreachable,

    #[error("TAP 102 Network Unreachable!")]
    NetworkUnreachable,

    #[error("TAP 103 Unknown probe error: {0}")]
    Unknown(i32),

    #[error("TAP 104 Probe could not be started: {0}")]
    System(i32),
}

/// Reply prefix shared by every decode failure.
pub const BAD_COMMAND_TAG: &str = "PROXY_BAD_COMMAND";

impl Error {
    /// Text sent to the client before the connection is closed.
    ///
    /// Always a single description line, optionally followed by a usage hint,
    /// and terminated by an empty line.
    pub fn reply(&self) -> String {
        match self {
            Error::InvalidConnect(_) => format!(
                "{} {}\nUsage: CONNECT {{host}}:{{port}}\n\n",
                BAD_COMMAND_TAG, self
            ),
            Error::InvalidTap(_) => {
                format!("{} {}\nUsage: TAP {{host}}\n\n", BAD_COMMAND_TAG, self)
            }
            Error::InvalidCurl(_) => format!(
                "{} {}\nUsage: CURL {{website}} {{method}}\n\n",
                BAD_COMMAND_TAG, self
            ),
            Error::BadCommand => format!("{} {}\n\n", BAD_COMMAND_TAG, self),
            Error::NotImplemented(command) => format!("{} 501 Not implemented\n\n", command),
            Error::Io(err) => format!(
                "Error {} occurred: {}\n\n",
                err.raw_os_error().unwrap_or(0),
                describe(err.kind())
            ),
            other => format!("{}\n\n", other),
        }
    }
}

/// Human-readable text for an I/O error category.
pub fn describe(kind: io::ErrorKind) -> &'static str {
    use io::ErrorKind::*;

    match kind {
        PermissionDenied => "Access denied!",
        NotFound => "File/folder not found!",
        InvalidInput => "Invalid argument given!",
        StorageFull => "No space on disk!",
        AddrInUse => "Address already in use!",
        NetworkDown => "Network is down!",
        NetworkUnreachable => "Network is unreachable!",
        ConnectionAborted => "Connection aborted!",
        ConnectionReset => "Connection reset by peer!",
        TimedOut => "Connection timed out!",
        ConnectionRefused => "Connection refused!",
        UnexpectedEof => "Connection closed by peer!",
        _ => "Unknown error code!",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_error_from_io() {
        let cases = vec![
            (io::ErrorKind::PermissionDenied, ConnectError::PermissionDenied),
            (io::ErrorKind::ConnectionRefused, ConnectError::Refused),
            (io::ErrorKind::TimedOut, ConnectError::TimedOut),
            (io::ErrorKind::Other, ConnectError::Other(0)),
        ];

        for (kind, expected) in cases {
            let err = io::Error::new(kind, "test error");
            assert_eq!(ConnectError::from(err), expected);
        }
    }

    #[test]
    fn test_connect_error_keeps_os_code() {
        // EHOSTUNREACH has no dedicated category.
        let err = io::Error::from_raw_os_error(113);
        match ConnectError::from(err) {
            ConnectError::Other(code) => assert_eq!(code, 113),
            other => panic!("expected generic error, got {:?}", other),
        }
    }

    #[test]
    fn test_replies_end_with_blank_line() {
        let errors = vec![
            Error::HandshakeTimeout,
            Error::HandshakeMismatch,
            Error::InvalidConnect("missing ':'".into()),
            Error::InvalidTap("line too short".into()),
            Error::BadCommand,
            Error::ResolutionFailed("nowhere.invalid".into()),
            Error::Connect(ConnectError::Refused),
            Error::Probe(ProbeError::HostUnreachable),
            Error::NotImplemented("CURL"),
            Error::Io(io::Error::from(io::ErrorKind::ConnectionReset)),
        ];

        for err in errors {
            let reply = err.reply();
            assert!(reply.ends_with("\n\n"), "bad terminator: {:?}", reply);
            assert!(!reply.starts_with('\n'), "empty first line: {:?}", reply);
        }
    }

    #[test]
    fn test_decode_failures_are_tagged() {
        assert!(Error::BadCommand.reply().starts_with(BAD_COMMAND_TAG));
        assert!(Error::InvalidConnect("x".into())
            .reply()
            .starts_with("PROXY_BAD_COMMAND Invalid CONNECT request"));
        assert!(Error::InvalidCurl("x".into())
            .reply()
            .contains("Usage: CURL {website} {method}"));
    }

    #[test]
    fn test_probe_replies() {
        assert_eq!(
            Error::Probe(ProbeError::HostUnreachable).reply(),
            "TAP 101 Host Unreachable!\n\n"
        );
        assert_eq!(
            Error::Probe(ProbeError::Unknown(3)).reply(),
            "TAP 103 Unknown probe error: 3\n\n"
        );
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(io::ErrorKind::AddrInUse), "Address already in use!");
        assert_eq!(describe(io::ErrorKind::Other), "Unknown error code!");
    }
}
