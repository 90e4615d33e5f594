// Copyright (c) 2026, Anthony DeDominic <adedomin@gmail.com>
//
// Permission to use, copy, modify, and/or distribute this software for any
// purpose with or without fee is hereby granted, provided that the above
// copyright notice and this permission notice appear in all copies.
//
// THE SOFTWARE IS PROVIDED "AS IS" AND THE AUTHOR DISCLAIMS ALL WARRANTIES
// WITH REGARD TO THIS SOFTWARE INCLUDING ALL IMPLIED WARRANTIES OF
// MERCHANTABILITY AND FITNESS. IN NO EVENT SHALL THE AUTHOR BE LIABLE FOR
// ANY SPECIAL, DIRECT, INDIRECT, OR CONSEQUENTIAL DAMAGES OR ANY DAMAGES
// WHATSOEVER RESULTING FROM LOSS OF USE, DATA OR PROFITS, WHETHER IN AN
// ACTION OF CONTRACT, NEGLIGENCE OR OTHER TORTIOUS ACTION, ARISING OUT OF
// OR IN CONNECTION WITH THE USE OR PERFORMANCE OF THIS SOFTWARE.

//! Client-IP derivation (spec §4.1). Never panics or throws; an unresolvable
//! IP is represented as `None` and left for downstream stages to handle.

use std::net::{IpAddr, Ipv6Addr, SocketAddr};

use http::HeaderMap;
use ipnetwork::IpNetwork;

/// Trusted-proxy CIDR ranges that upstream L4 hops must belong to before
/// `cf-connecting-ip` is honored.
#[derive(Clone, Default)]
pub struct TrustedProxies(Vec<IpNetwork>);

impl TrustedProxies {
    pub fn new(nets: Vec<IpNetwork>) -> Self {
        Self(nets)
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        self.0.iter().any(|net| net.contains(ip))
    }
}

/// Strip the IPv4-mapped-IPv6 prefix (`::ffff:a.b.c.d`), matching step 1 of
/// spec §4.1's algorithm.
pub fn normalize(addr: IpAddr) -> IpAddr {
    match addr {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(IpAddr::V6(v6)),
        other => other,
    }
}

/// "Public" per spec §4.1: not private/loopback/link-local/reserved/multicast.
/// Address syntax failures are handled by the caller (an unparsable string is
/// simply not a candidate).
pub fn is_public(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_documentation()
                || v4.is_multicast()
                || v4.is_unspecified()
                || is_ipv4_reserved(v4))
        }
        IpAddr::V6(v6) => !(is_ipv6_unique_local(v6)
            || v6.is_loopback()
            || is_ipv6_link_local(v6)
            || v6.is_multicast()
            || v6.is_unspecified()),
    }
}

fn is_ipv4_reserved(v4: std::net::Ipv4Addr) -> bool {
    // 240.0.0.0/4 "reserved for future use", excluding the broadcast address
    // which is handled separately above.
    v4.octets()[0] >= 240
}

fn is_ipv6_unique_local(v6: Ipv6Addr) -> bool {
    (v6.segments()[0] & 0xfe00) == 0xfc00 // fc00::/7
}

fn is_ipv6_link_local(v6: Ipv6Addr) -> bool {
    (v6.segments()[0] & 0xffc0) == 0xfe80 // fe80::/10
}

fn parse_public(candidate: &str) -> Option<IpAddr> {
    let ip: IpAddr = candidate.trim().parse().ok()?;
    let ip = normalize(ip);
    is_public(ip).then_some(ip)
}

/// Resolve the client IP for a request per spec §4.1.
pub fn resolve(remote: Option<SocketAddr>, headers: &HeaderMap, trusted: &TrustedProxies) -> Option<IpAddr> {
    let socket_ip = remote.map(|s| normalize(s.ip()));

    if let Some(socket_ip) = socket_ip
        && trusted.contains(socket_ip)
        && let Some(cf) = header_str(headers, "cf-connecting-ip")
        && let Some(ip) = parse_public(cf)
    {
        return Some(ip);
    }

    if let Some(real_ip) = header_str(headers, "x-real-ip")
        && let Some(ip) = parse_public(real_ip)
    {
        return Some(ip);
    }

    if let Some(xff) = header_str(headers, "x-forwarded-for") {
        let candidates: Vec<&str> = xff.split(',').map(str::trim).collect();
        if let Some(ip) = candidates.iter().find_map(|c| parse_public(c)) {
            return Some(ip);
        }
        if let Some(first) = candidates.first()
            && let Ok(ip) = first.parse::<IpAddr>()
        {
            return Some(normalize(ip));
        }
    }

    socket_ip
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Whether `ip` is internal traffic per spec §4.3 step 2 (private, loopback,
/// or link-local — *not* the full "public" exclusion set, which also covers
/// multicast/reserved addresses that aren't "internal" in the same sense).
pub fn is_internal(ip: IpAddr) -> bool {
    match normalize(ip) {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback() || v4.is_link_local(),
        IpAddr::V6(v6) => is_ipv6_unique_local(v6) || v6.is_loopback() || is_ipv6_link_local(v6),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn net(s: &str) -> IpNetwork {
        s.parse().unwrap()
    }

    #[test]
    fn trusts_cf_header_only_from_trusted_proxy() {
        let trusted = TrustedProxies::new(vec![net("10.0.0.0/8")]);
        let mut headers = HeaderMap::new();
        headers.insert("cf-connecting-ip", "8.8.8.8".parse().unwrap());
        let remote = Some(SocketAddr::from((Ipv4Addr::new(10, 1, 2, 3), 1234)));
        assert_eq!(
            resolve(remote, &headers, &trusted),
            Some(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)))
        );

        let untrusted_remote = Some(SocketAddr::from((Ipv4Addr::new(1, 2, 3, 4), 1234)));
        assert_eq!(
            resolve(untrusted_remote, &headers, &trusted),
            Some(IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4)))
        );
    }

    #[test]
    fn xff_picks_first_public_else_first_element() {
        let trusted = TrustedProxies::default();
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            "10.0.0.1, 9.9.9.9, 1.1.1.1".parse().unwrap(),
        );
        assert_eq!(
            resolve(None, &headers, &trusted),
            Some(IpAddr::V4(Ipv4Addr::new(9, 9, 9, 9)))
        );

        let mut headers_all_private = HeaderMap::new();
        headers_all_private.insert("x-forwarded-for", "10.0.0.1, 192.168.0.2".parse().unwrap());
        assert_eq!(
            resolve(None, &headers_all_private, &trusted),
            Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)))
        );
    }

    #[test]
    fn falls_back_to_socket_addr() {
        let trusted = TrustedProxies::default();
        let headers = HeaderMap::new();
        let remote = Some(SocketAddr::from((Ipv4Addr::new(7, 7, 7, 7), 80)));
        assert_eq!(
            resolve(remote, &headers, &trusted),
            Some(IpAddr::V4(Ipv4Addr::new(7, 7, 7, 7)))
        );
    }

    #[test]
    fn public_classification() {
        assert!(is_public(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8))));
        assert!(!is_public(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))));
        assert!(!is_public(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))));
        assert!(!is_public(IpAddr::V4(Ipv4Addr::new(169, 254, 1, 1))));
    }
}
