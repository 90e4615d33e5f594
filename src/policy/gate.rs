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

//! Per-request policy enforcement (spec §4.3). A pure decision function over
//! [`PolicyCache`] plus a geo lookup; the tower layer in
//! [`crate::middleware::policy_gate`] is a thin wrapper around [`decide`].

use std::net::IpAddr;

use super::PolicyCache;
use crate::geo::GeoLookup;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Pass,
    RejectInvalidClient,
    RejectPolicy,
}

/// Implements spec §4.3's ordered contract: missing IP -> 400, internal
/// traffic -> pass, allowlist dominates, then denylist, then country block.
pub fn decide(ip: Option<IpAddr>, cache: &PolicyCache, geo: &dyn GeoLookup) -> Decision {
    let Some(ip) = ip else {
        return Decision::RejectInvalidClient;
    };

    if crate::ip::is_internal(ip) {
        return Decision::Pass;
    }

    if cache.is_allowlisted(ip) {
        return Decision::Pass;
    }

    if cache.is_denylisted(ip) {
        return Decision::RejectPolicy;
    }

    if let Some(info) = geo.lookup(ip)
        && let Some(country) = info.country
        && cache.is_country_blocked(&country)
    {
        return Decision::RejectPolicy;
    }

    Decision::Pass
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{GeoInfo, NoopGeoLookup, StaticGeoLookup};
    use crate::policy::{KEY_DENY_CIDRS, KEY_DENY_COUNTRIES, KEY_DENY_IPS};
    use crate::store::memory::MemoryStore;
    use std::sync::Arc;

    async fn cache_with(seed: &[(&str, &[&str])]) -> PolicyCache {
        let store = Arc::new(MemoryStore::new());
        for (key, members) in seed {
            store.seed_set(key, members.iter().map(|s| s.to_string()));
        }
        let cache = PolicyCache::new(store);
        cache.bootstrap().await.unwrap();
        cache
    }

    #[tokio::test]
    async fn missing_ip_is_rejected() {
        let cache = cache_with(&[]).await;
        assert_eq!(
            decide(None, &cache, &NoopGeoLookup),
            Decision::RejectInvalidClient
        );
    }

    #[tokio::test]
    async fn internal_traffic_passes() {
        let cache = cache_with(&[(KEY_DENY_IPS, &["127.0.0.1"])]).await;
        let ip = "127.0.0.1".parse().unwrap();
        assert_eq!(decide(Some(ip), &cache, &NoopGeoLookup), Decision::Pass);
    }

    #[tokio::test]
    async fn cidr_denylist_rejects() {
        let cache = cache_with(&[(KEY_DENY_CIDRS, &["10.0.0.0/8"])]).await;
        let ip = "10.0.5.7".parse().unwrap();
        assert_eq!(decide(Some(ip), &cache, &NoopGeoLookup), Decision::RejectPolicy);
    }

    #[tokio::test]
    async fn country_block_rejects() {
        let cache = cache_with(&[(KEY_DENY_COUNTRIES, &["RU"])]).await;
        let ip = "203.0.113.9".parse().unwrap();
        let geo = StaticGeoLookup::new(ip, GeoInfo { country: Some("RU".to_owned()) });
        assert_eq!(decide(Some(ip), &cache, &geo), Decision::RejectPolicy);
    }
}
