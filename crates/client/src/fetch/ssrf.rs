//! SSRF (Server-Side Request Forgery) protection.
//!
//! Validates that URLs and resolved IP addresses are not pointing to
//! private, internal, or reserved addresses. The same check runs on the
//! input URL, on every redirect hop, and on the final URL of a fetch or a
//! browser navigation.
use std::net::{IpAddr, SocketAddr};

use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use url::{Host, Url};

/// Hostnames that always refer to the local machine.
pub const BLOCKED_HOSTS: &[&str] = &["localhost", "0.0.0.0"];

/// Error type for SSRF validation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SsrfError {
    #[error("blocked scheme: {0}")]
    BlockedScheme(String),

    #[error("blocked host: {0}")]
    BlockedHost(String),

    #[error("blocked IP: {0} (private/reserved)")]
    BlockedIp(IpAddr),

    #[error("missing host")]
    MissingHost,

    #[error("DNS resolution failed: {0}")]
    DnsError(String),
}

/// Check if an IP address is private, reserved, or otherwise blocked.
///
/// This covers:
/// - Loopback addresses (127.0.0.0/8, ::1)
/// - RFC 1918 private ranges (10/8, 172.16/12, 192.168/16)
/// - Link-local addresses (169.254/16, fe80::/10)
/// - Multicast addresses (224/4, ff00::/8)
/// - Unspecified addresses (0.0.0.0/8, ::)
/// - IPv6 unique local (fc00::/7)
/// - IPv4-mapped IPv6 addresses of any of the above
pub fn is_private_or_reserved(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_multicast()
                || v4.is_broadcast()
                || v4.is_unspecified()
                || v4.octets()[0] == 0
        }
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_private_or_reserved(IpAddr::V4(mapped));
            }
            v6.is_loopback()
                || v6.is_multicast()
                || v6.is_unspecified()
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}

/// Validate that an IP address is not private or reserved.
///
/// Returns an error if the IP is blocked.
pub fn validate_ip(ip: IpAddr) -> Result<(), SsrfError> {
    if is_private_or_reserved(ip) { Err(SsrfError::BlockedIp(ip)) } else { Ok(()) }
}

/// Validate a URL without any network I/O.
///
/// Rejects non-http(s) schemes, `localhost` (and `*.localhost`), `0.0.0.0`,
/// and IP literals in private or reserved ranges.
pub fn guard_url(url: &Url) -> Result<(), SsrfError> {
    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(SsrfError::BlockedScheme(scheme.to_string())),
    }

    match url.host() {
        None => Err(SsrfError::MissingHost),
        Some(Host::Ipv4(v4)) => validate_ip(IpAddr::V4(v4)),
        Some(Host::Ipv6(v6)) => validate_ip(IpAddr::V6(v6)),
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            if domain.is_empty() {
                return Err(SsrfError::MissingHost);
            }
            if BLOCKED_HOSTS.contains(&domain.as_str()) || domain.ends_with(".localhost") {
                return Err(SsrfError::BlockedHost(domain));
            }
            Ok(())
        }
    }
}

/// Resolve the URL's host and reject it if any answer is private.
///
/// IP-literal hosts are validated directly without a lookup.
pub async fn ensure_public_host(url: &Url) -> Result<(), SsrfError> {
    guard_url(url)?;

    let Some(Host::Domain(domain)) = url.host() else {
        return Ok(());
    };
    let port = url.port_or_known_default().unwrap_or(443);

    let addrs = tokio::net::lookup_host((domain, port))
        .await
        .map_err(|e| SsrfError::DnsError(format!("{domain}: {e}")))?;
    public_answers(domain, addrs).map(|_| ())
}

/// Keep a lookup result only when every answer is public.
///
/// A single private answer rejects the whole name, so a resolver that
/// alternates answers cannot slip a private address through.
pub fn public_answers(
    host: &str, addrs: impl IntoIterator<Item = SocketAddr>,
) -> Result<Vec<SocketAddr>, SsrfError> {
    let addrs: Vec<SocketAddr> = addrs.into_iter().collect();
    if addrs.is_empty() {
        return Err(SsrfError::DnsError(format!("{host}: no addresses")));
    }
    for addr in &addrs {
        validate_ip(addr.ip())?;
    }
    Ok(addrs)
}

/// DNS resolver for the HTTP client that applies [`public_answers`] to
/// every connection, redirect hops included. The connection uses exactly
/// the addresses that were checked.
#[derive(Debug, Clone, Copy, Default)]
pub struct PublicResolver;

impl Resolve for PublicResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let host = name.as_str().to_string();
        Box::pin(async move {
            let answers = tokio::net::lookup_host((host.as_str(), 0))
                .await
                .map_err(|e| SsrfError::DnsError(format!("{host}: {e}")))?;
            let addrs: Addrs = Box::new(public_answers(&host, answers)?.into_iter());
            Ok::<_, Box<dyn std::error::Error + Send + Sync>>(addrs)
        })
    }
}
