//! Host name resolution.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use tokio::net::lookup_host;
use tracing::debug;

use crate::config::AddressSelection;
use crate::error::{Error, Result};

/// Resolve a textual host to one IPv4 address.
///
/// Literal IPv4 addresses are returned unchanged without a lookup.
pub async fn resolve_host(host: &str, selection: AddressSelection) -> Result<Ipv4Addr> {
    if let Ok(addr) = host.parse::<Ipv4Addr>() {
        return Ok(addr);
    }

    let addrs = lookup_host((host, 0)).await.map_err(|e| {
        debug!("Lookup of {} failed: {}", host, e);
        Error::ResolutionFailed(host.to_string())
    })?;

    let chosen = select_address(addrs.filter_map(ipv4), selection)
        .ok_or_else(|| Error::ResolutionFailed(host.to_string()))?;

    debug!("Resolved {} to {}", host, chosen);
    Ok(chosen)
}

/// Pick one address from a lookup result, in resolver order.
pub fn select_address<I>(addrs: I, selection: AddressSelection) -> Option<Ipv4Addr>
where
    I: IntoIterator<Item = Ipv4Addr>,
{
    let mut addrs = addrs.into_iter();
    match selection {
        AddressSelection::First => addrs.next(),
        AddressSelection::Last => addrs.last(),
    }
}

fn ipv4(addr: SocketAddr) -> Option<Ipv4Addr> {
    match addr.ip() {
        IpAddr::V4(v4) => Some(v4),
        IpAddr::V6(_) => None,
    }
}
