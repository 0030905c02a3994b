//! Reachability probing for TAP.

use std::future::Future;
use std::net::Ipv4Addr;
use std::process::{ExitStatus, Stdio};

use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::ProbeConfig;
use crate::error::ProbeError;

/// Checks whether a host answers.
pub trait ReachabilityProbe: Send + Sync + 'static {
    fn probe(&self, addr: Ipv4Addr) -> impl Future<Output = Result<(), ProbeError>> + Send;
}

/// Probe that runs a ping-style program directly, without a shell.
///
/// The program is invoked as `<program> -c <count> <addr>`. Only a resolved
/// address is ever passed, never client-supplied text.
#[derive(Debug, Clone)]
pub struct PingProbe {
    program: String,
    count: u32,
}

impl PingProbe {
    pub fn new(program: impl Into<String>, count: u32) -> Self {
        Self {
            program: program.into(),
            count,
        }
    }

    pub fn from_config(config: &ProbeConfig) -> Self {
        Self::new(config.program.clone(), config.count)
    }
}

impl Default for PingProbe {
    fn default() -> Self {
        Self::from_config(&ProbeConfig::default())
    }
}

impl ReachabilityProbe for PingProbe {
    async fn probe(&self, addr: Ipv4Addr) -> Result<(), ProbeError> {
        debug!("Probing {} with {}", addr, self.program);

        let status = Command::new(&self.program)
            .arg("-c")
            .arg(self.count.to_string())
            .arg(addr.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| {
                warn!("Failed to run {}: {}", self.program, e);
                ProbeError::System(e.raw_os_error().unwrap_or(0))
            })?;

        interpret_status(status)
    }
}

/// Map a ping-style exit status to a probe outcome.
fn interpret_status(status: ExitStatus) -> Result<(), ProbeError> {
    match status.code() {
        Some(0) => Ok(()),
        Some(1) => Err(ProbeError::HostUnreachable),
        Some(2) => Err(ProbeError::NetworkUnreachable),
        Some(code) => Err(ProbeError::Unknown(code)),
        // Killed by a signal.
        None => Err(ProbeError::Unknown(-1)),
    }
}
