//! Client address resolution behind proxies

use std::net::{IpAddr, SocketAddr};

use axum::http::HeaderMap;

/// Forwarding headers holding comma-separated address chains, in priority order
const FORWARDED_HEADERS: [&str; 3] = ["x-original-forwarded-for", "x-forwarded-for", "x-remote-addr"];

const REAL_IP_HEADER: &str = "x-real-ip";

/// Whether `ip` lies in an RFC 1918 private range
pub fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private(),
        IpAddr::V6(v6) => v6.to_ipv4_mapped().is_some_and(|v4| v4.is_private()),
    }
}

fn public(raw: &str) -> Option<IpAddr> {
    raw.trim()
        .parse::<IpAddr>()
        .ok()
        .filter(|ip| !is_private_ip(ip))
}

/// The first public client address.
///
/// Looks through the forwarding chains, then `X-Real-IP`, then the socket
/// peer. Private addresses are skipped everywhere.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<IpAddr> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    FORWARDED_HEADERS
        .iter()
        .filter_map(|name| header(name))
        .find_map(|chain| chain.split(',').find_map(public))
        .or_else(|| header(REAL_IP_HEADER).and_then(public))
        .or_else(|| peer.map(|addr| addr.ip()).filter(|ip| !is_private_ip(ip)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_private_ranges() {
        for private in ["10.1.2.3", "172.16.0.1", "172.31.255.255", "192.168.1.1"] {
            assert!(is_private_ip(&private.parse().unwrap()), "{}", private);
        }
        for public in ["8.8.8.8", "172.32.0.1", "11.0.0.1"] {
            assert!(!is_private_ip(&public.parse().unwrap()), "{}", public);
        }
    }

    #[test]
    fn test_forwarded_chain_skips_private_hops() {
        let h = headers(&[("x-forwarded-for", "10.0.0.5, 203.0.113.7, 8.8.8.8")]);
        assert_eq!(client_ip(&h, None), Some("203.0.113.7".parse().unwrap()));
    }

    #[test]
    fn test_header_priority() {
        let h = headers(&[
            ("x-forwarded-for", "203.0.113.7"),
            ("x-original-forwarded-for", "198.51.100.1"),
            ("x-real-ip", "192.0.2.1"),
        ]);
        assert_eq!(client_ip(&h, None), Some("198.51.100.1".parse().unwrap()));

        let h = headers(&[("x-forwarded-for", "10.0.0.1"), ("x-real-ip", "192.0.2.1")]);
        assert_eq!(client_ip(&h, None), Some("192.0.2.1".parse().unwrap()));
    }

    #[test]
    fn test_peer_fallback() {
        let peer: SocketAddr = "198.51.100.9:4000".parse().unwrap();
        assert_eq!(client_ip(&HeaderMap::new(), Some(peer)), Some(peer.ip()));

        let private_peer: SocketAddr = "192.168.0.2:4000".parse().unwrap();
        assert_eq!(client_ip(&HeaderMap::new(), Some(private_peer)), None);
        assert_eq!(client_ip(&headers(&[("x-real-ip", "garbage")]), None), None);
    }
}
