use crate::error::ProxyError;
use std::net::{Ipv4Addr, Ipv6Addr};
use url::{Host, Url};

/// Parse and validate a proxy target.
///
/// Accepts only absolute `http://` and `https://` URLs with a host. When
/// `block_private` is set, IP-literal hosts in private or reserved ranges are
/// rejected as well. Hostnames are never resolved here.
///
/// # Errors
/// Returns [`ProxyError::InvalidTarget`] for:
/// - Unparseable or relative URLs
/// - Non-HTTP(S) schemes
/// - URLs without a host
/// - Private/reserved IP literals (only with `block_private`)
pub fn parse_target(raw: &str, block_private: bool) -> Result<Url, ProxyError> {
    let parsed =
        Url::parse(raw).map_err(|e| ProxyError::InvalidTarget(format!("{raw}: {e}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(ProxyError::InvalidTarget(format!(
                "scheme '{scheme}' not allowed, only http/https"
            )));
        }
    }

    let host = parsed
        .host()
        .ok_or_else(|| ProxyError::InvalidTarget(format!("no host in {raw}")))?;

    if block_private {
        match host {
            Host::Ipv4(ip) if is_blocked_ipv4(ip) => {
                return Err(ProxyError::InvalidTarget(format!(
                    "private or reserved IPv4 address not allowed: {ip}"
                )));
            }
            Host::Ipv6(ip) if is_blocked_ipv6(ip) => {
                return Err(ProxyError::InvalidTarget(format!(
                    "private or reserved IPv6 address not allowed: {ip}"
                )));
            }
            Host::Domain(name) if name.eq_ignore_ascii_case("localhost") => {
                return Err(ProxyError::InvalidTarget("localhost not allowed".to_string()));
            }
            _ => {}
        }
    }

    Ok(parsed)
}

/// RFC 1918, loopback, link-local and the `0/8` "this network" block
fn is_blocked_ipv4(ip: Ipv4Addr) -> bool {
    ip.is_private() || ip.is_loopback() || ip.is_link_local() || ip.octets()[0] == 0
}

/// Loopback, unspecified, link-local, unique-local, and IPv4-mapped forms of
/// the blocked IPv4 ranges
fn is_blocked_ipv6(ip: Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_blocked_ipv4(v4);
    }

    ip.is_loopback() || ip.is_unspecified() || ip.is_unicast_link_local() || ip.is_unique_local()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_http_and_https() {
        assert!(parse_target("http://cdn.example.com/live.m3u8", false).is_ok());
        assert!(parse_target("https://cdn.example.com/live.m3u8?token=abc", false).is_ok());
    }

    #[test]
    fn keeps_query_string() {
        let url = parse_target("https://cdn.example.com/a.m3u8?sig=1&exp=2", false).unwrap();
        assert_eq!(url.query(), Some("sig=1&exp=2"));
    }

    #[test]
    fn rejects_relative_and_garbage() {
        assert!(parse_target("", false).is_err());
        assert!(parse_target("not-a-url", false).is_err());
        assert!(parse_target("/videos/index.m3u8", false).is_err());
        assert!(parse_target("cdn.example.com/stream", false).is_err());
    }

    #[test]
    fn rejects_other_schemes() {
        assert!(parse_target("ftp://cdn.example.com/file.ts", false).is_err());
        assert!(parse_target("file:///etc/passwd", false).is_err());
        assert!(parse_target("data:text/plain,hello", false).is_err());
    }

    #[test]
    fn private_addresses_allowed_unless_blocking() {
        assert!(parse_target("http://127.0.0.1:8080/live.m3u8", false).is_ok());
        assert!(parse_target("http://192.168.1.10/live.m3u8", false).is_ok());
    }

    #[test]
    fn blocks_private_ipv4_when_enabled() {
        for url in [
            "http://127.0.0.1/stream",
            "http://10.1.2.3/stream",
            "http://172.16.0.1/stream",
            "http://172.31.255.255/stream",
            "http://192.168.0.1/stream",
            "http://169.254.169.254/latest/meta-data/",
            "http://0.0.0.0/stream",
        ] {
            assert!(parse_target(url, true).is_err(), "{url} should be blocked");
        }
    }

    #[test]
    fn blocks_private_ipv6_and_localhost_when_enabled() {
        assert!(parse_target("http://[::1]/stream", true).is_err());
        assert!(parse_target("http://[fe80::1]/stream", true).is_err());
        assert!(parse_target("http://[fd00::1]/stream", true).is_err());
        assert!(parse_target("http://localhost:3000/stream", true).is_err());
    }

    #[test]
    fn blocks_ipv4_mapped_and_unspecified_ipv6() {
        assert!(parse_target("http://[::ffff:127.0.0.1]/stream", true).is_err());
        assert!(parse_target("http://[::ffff:10.0.0.8]/stream", true).is_err());
        assert!(parse_target("http://[::]/stream", true).is_err());
        assert!(parse_target("http://[::ffff:8.8.8.8]/stream", true).is_ok());
        assert!(parse_target("http://[2001:db8::1]/stream", true).is_ok());
    }

    #[test]
    fn range_boundaries_not_blocked() {
        assert!(parse_target("http://172.15.255.255/stream", true).is_ok());
        assert!(parse_target("http://172.32.0.0/stream", true).is_ok());
        assert!(parse_target("https://8.8.8.8/stream", true).is_ok());
        assert!(parse_target("https://cdn.example.com/stream", true).is_ok());
    }
}
