//! Configuration structures for tapline.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Listener configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Per-session timeouts.
    #[serde(default)]
    pub session: SessionConfig,

    /// Host name resolution.
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Reachability probe.
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Parse a TOML document, filling unset fields with defaults.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }
}

/// Server binding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Listening port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Pending connection queue depth.
    #[serde(default = "default_backlog")]
    pub backlog: u32,
}

impl ServerConfig {
    /// The socket address the listener binds to.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| Error::Config(format!("invalid bind address {}:{}", self.host, self.port)))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            backlog: default_backlog(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8888
}

fn default_backlog() -> u32 {
    10
}

/// Session timeouts, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// How long to wait for the client hello.
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_ms: u64,

    /// How long to wait for the command line. Unset waits forever.
    #[serde(default)]
    pub command_timeout_ms: Option<u64>,

    /// Outbound connect timeout. Unset leaves it to the OS.
    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,
}

impl SessionConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_ms.map(Duration::from_millis)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: default_handshake_timeout(),
            command_timeout_ms: None,
            connect_timeout_ms: None,
        }
    }
}

fn default_handshake_timeout() -> u64 {
    10_000
}

/// Which entry of a multi-address lookup result is used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressSelection {
    /// The first IPv4 address the resolver returns.
    #[default]
    First,
    /// The last IPv4 address the resolver returns.
    Last,
}

/// Resolver configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolverConfig {
    #[serde(default)]
    pub selection: AddressSelection,
}

/// Reachability probe configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Program invoked for TAP, without a shell.
    #[serde(default = "default_probe_program")]
    pub program: String,

    /// Echo requests sent per probe.
    #[serde(default = "default_probe_count")]
    pub count: u32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            program: default_probe_program(),
            count: default_probe_count(),
        }
    }
}

fn default_probe_program() -> String {
    "ping".to_string()
}

fn default_probe_count() -> u32 {
    4
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional).
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8888);
        assert_eq!(config.server.backlog, 10);
        assert_eq!(config.session.handshake_timeout(), Duration::from_secs(10));
        assert_eq!(config.session.command_timeout(), None);
        assert_eq!(config.resolver.selection, AddressSelection::First);
        assert_eq!(config.probe.program, "ping");
        assert_eq!(config.probe.count, 4);
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn test_partial_document() {
        let config = Config::from_toml(
            r#"
            [server]
            port = 9999

            [session]
            command_timeout_ms = 2500

            [resolver]
            selection = "last"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9999);
        assert_eq!(config.server.backlog, 10);
        assert_eq!(
            config.session.command_timeout(),
            Some(Duration::from_millis(2500))
        );
        assert_eq!(config.resolver.selection, AddressSelection::Last);
    }

    #[test]
    fn test_invalid_document() {
        let err = Config::from_toml("[server]\nport = \"eighty\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_bind_addr() {
        let server = ServerConfig::default();
        assert_eq!(server.bind_addr().unwrap().to_string(), "0.0.0.0:8888");

        let bad = ServerConfig {
            host: "not an address".into(),
            ..ServerConfig::default()
        };
        assert!(bad.bind_addr().is_err());
    }
}
