use anyhow::{Context, Result, bail};
use log::debug;
use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};

/// Resolve a hostname or dotted-quad literal to one IPv4 address
pub fn resolve_target(host: &str) -> Result<Ipv4Addr> {
    // Try parsing as IP address first
    if let Ok(ip) = host.parse::<IpAddr>() {
        return match ip {
            IpAddr::V4(v4) => Ok(v4),
            IpAddr::V6(_) => bail!("{}: IPv6 addresses are not supported", host),
        };
    }

    let addrs: Vec<IpAddr> = (host, 0)
        .to_socket_addrs()
        .with_context(|| format!("Cannot resolve {}: Unknown host", host))?
        .map(|s| s.ip())
        .collect();

    if addrs.is_empty() {
        bail!("No addresses found for {}", host);
    }

    let Some(v4) = addrs.iter().find_map(|ip| match ip {
        IpAddr::V4(v4) => Some(*v4),
        IpAddr::V6(_) => None,
    }) else {
        bail!("No IPv4 address found for {}", host);
    };

    if addrs.len() > 1 {
        debug!("{} has {} addresses, using {}", host, addrs.len(), v4);
    }
    Ok(v4)
}
