//! # Tapline Core
//!
//! Core library for the tapline relay.
//! Provides the hello handshake, the CONNECT/TAP/CURL command protocol and
//! the bidirectional TCP relay.

pub mod command;
pub mod config;
pub mod error;
pub mod proxy;
pub mod resolve;
pub mod server;
pub mod session;

pub use command::{Command, CommandKind};
pub use config::{
    AddressSelection, Config, LoggingConfig, ProbeConfig, ResolverConfig, ServerConfig,
    SessionConfig,
};
pub use error::{ConnectError, Error, ProbeError, Result};
pub use proxy::{PingProbe, ReachabilityProbe};
pub use server::RelayServer;
pub use session::{Session, SessionInfo, SessionState};
