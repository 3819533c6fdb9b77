// src/importer/security.rs
//! Outbound URL policy: scheme, credentials, host blocklist, port, and the
//! address classes every resolved IP is checked against.
//!
//! The fetcher calls [`UrlValidator::validate`] on every redirect hop, so a
//! public URL that redirects (or re-resolves) to an internal address is refused
//! at the hop where it happens.

use async_trait::async_trait;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use url::{Host, Url};

use crate::config::importer::{normalize_host, ImporterConfig};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlockReason {
    #[error("Only http/https URLs are allowed.")]
    UnsupportedScheme(String),
    #[error("URLs containing embedded credentials are blocked.")]
    EmbeddedCredentials,
    #[error("URL host is missing.")]
    MissingHost,
    #[error("Blocked host '{0}'.")]
    BlockedHost(String),
    #[error("Blocked non-standard port '{0}'.")]
    BlockedPort(u16),
    #[error("Resolved to private/local IP '{0}'.")]
    PrivateAddress(IpAddr),
}

/// DNS seam. Production uses the system resolver; tests inject fixed answers.
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>>;
}

pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, 0)).await?;
        Ok(addrs.map(|a| a.ip()).collect())
    }
}

#[derive(Clone)]
pub struct UrlValidator {
    allowed_ports: Vec<u16>,
    blocked_hostnames: Vec<String>,
    resolver: Arc<dyn HostResolver>,
}

impl UrlValidator {
    pub fn new(cfg: &ImporterConfig, resolver: Arc<dyn HostResolver>) -> Self {
        Self {
            allowed_ports: cfg.allowed_ports.clone(),
            blocked_hostnames: cfg.blocked_hostnames.clone(),
            resolver,
        }
    }

    pub async fn validate(&self, url: &Url) -> Result<(), BlockReason> {
        let scheme = url.scheme().to_ascii_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(BlockReason::UnsupportedScheme(scheme));
        }

        if !url.username().is_empty() || url.password().is_some() {
            return Err(BlockReason::EmbeddedCredentials);
        }

        let host = match url.host_str() {
            Some(h) => normalize_host(h),
            None => return Err(BlockReason::MissingHost),
        };
        if host.is_empty() {
            return Err(BlockReason::MissingHost);
        }
        if self.blocked_hostnames.iter().any(|b| *b == host) {
            return Err(BlockReason::BlockedHost(host));
        }

        // `port()` is None when the port is absent or equals the scheme default.
        if let Some(port) = url.port() {
            if !self.allowed_ports.contains(&port) {
                return Err(BlockReason::BlockedPort(port));
            }
        }

        match url.host() {
            Some(Host::Ipv4(ip)) => check_ip(IpAddr::V4(ip)),
            Some(Host::Ipv6(ip)) => check_ip(IpAddr::V6(ip)),
            Some(Host::Domain(domain)) => {
                let addrs = match self.resolver.resolve(domain).await {
                    Ok(a) => a,
                    Err(e) => {
                        // The fetch attempt reports DNS failures itself.
                        tracing::debug!(target: "importer", host = %domain, error = %e, "dns lookup failed during validation");
                        return Ok(());
                    }
                };
                for ip in addrs {
                    check_ip(ip)?;
                }
                Ok(())
            }
            None => Err(BlockReason::MissingHost),
        }
    }
}

fn check_ip(ip: IpAddr) -> Result<(), BlockReason> {
    if is_blocked_ip(&ip) {
        Err(BlockReason::PrivateAddress(ip))
    } else {
        Ok(())
    }
}

/// True for any address that must never be the target of an outbound fetch.
pub fn is_blocked_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_blocked_v4(v4),
        IpAddr::V6(v6) => is_blocked_v6(v6),
    }
}

fn is_blocked_v4(ip: &Ipv4Addr) -> bool {
    let [a, b, c, _] = ip.octets();
    ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_multicast()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_documentation()
        // "this network" 0.0.0.0/8
        || a == 0
        // shared address space 100.64.0.0/10
        || (a == 100 && (b & 0xc0) == 64)
        // IETF protocol assignments 192.0.0.0/24
        || (a == 192 && b == 0 && c == 0)
        // benchmarking 198.18.0.0/15
        || (a == 198 && (b & 0xfe) == 18)
        // reserved 240.0.0.0/4
        || a >= 240
}

fn is_blocked_v6(ip: &Ipv6Addr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() || ip.is_multicast() {
        return true;
    }
    // IPv4-mapped ::ffff:a.b.c.d
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_blocked_v4(&v4);
    }
    let seg = ip.segments();
    // IPv4-compatible ::a.b.c.d (deprecated, still routable by some stacks)
    if seg[..6].iter().all(|s| *s == 0) {
        return is_blocked_v4(&embedded_v4(seg[6], seg[7]));
    }
    // NAT64 well-known prefix 64:ff9b::/96 carries the target IPv4
    if seg[0] == 0x0064 && seg[1] == 0xff9b && seg[2..6].iter().all(|s| *s == 0) {
        return is_blocked_v4(&embedded_v4(seg[6], seg[7]));
    }
    // everything outside global unicast 2000::/3: unique local, link-local,
    // site-local, discard-only 100::/64, local NAT64 64:ff9b:1::/48, reserved
    if (seg[0] & 0xe000) != 0x2000 {
        return true;
    }
    // IETF protocol assignments 2001::/23, Teredo 2001::/32 included
    if seg[0] == 0x2001 && seg[1] < 0x0200 {
        return true;
    }
    // documentation 2001:db8::/32 and 3fff::/20
    if (seg[0] == 0x2001 && seg[1] == 0x0db8) || (seg[0] == 0x3fff && seg[1] < 0x1000) {
        return true;
    }
    // 6to4 2002:a.b.c.d::/48
    if seg[0] == 0x2002 {
        return is_blocked_v4(&embedded_v4(seg[1], seg[2]));
    }
    false
}

fn embedded_v4(hi: u16, lo: u16) -> Ipv4Addr {
    Ipv4Addr::new((hi >> 8) as u8, hi as u8, (lo >> 8) as u8, lo as u8)
}
