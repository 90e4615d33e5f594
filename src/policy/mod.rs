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

//! Security-policy engine: [`PolicyCache`]/[`InvalidationBus`] (spec §4.2) and
//! [`PolicyGate`] (spec §4.3).

pub mod gate;
pub mod invalidation;

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::RwLock;

use ipnetwork::IpNetwork;
use log::warn;

use crate::store::Store;

pub const KEY_ALLOW_IPS: &str = "geo:whitelist:ips";
pub const KEY_DENY_IPS: &str = "geo:blocklist:ips";
pub const KEY_DENY_CIDRS: &str = "geo:blocklist:cidrs";
pub const KEY_DENY_COUNTRIES: &str = "geo:blocklist:countries";
pub const INVALIDATION_CHANNEL: &str = "invalidation";
pub const INVALIDATION_PAYLOAD: &str = "reload";

/// Immutable image of the four policy sets (spec §3). Replaced wholesale on
/// reload so readers never observe a torn list.
#[derive(Default)]
pub struct PolicySnapshot {
    ip_allow: HashSet<IpAddr>,
    ip_deny: HashSet<IpAddr>,
    cidr_deny: Vec<IpNetwork>,
    country_deny: HashSet<String>,
}

impl PolicySnapshot {
    fn from_raw(
        ip_allow: Vec<String>,
        ip_deny: Vec<String>,
        cidr_deny: Vec<String>,
        country_deny: Vec<String>,
    ) -> Self {
        Self {
            ip_allow: ip_allow.iter().filter_map(|s| s.parse().ok()).collect(),
            ip_deny: ip_deny.iter().filter_map(|s| s.parse().ok()).collect(),
            cidr_deny: cidr_deny.iter().filter_map(|s| s.parse().ok()).collect(),
            country_deny: country_deny.iter().map(|c| c.to_uppercase()).collect(),
        }
    }

    pub fn is_allowlisted(&self, ip: IpAddr) -> bool {
        self.ip_allow.contains(&ip)
    }

    pub fn is_denylisted(&self, ip: IpAddr) -> bool {
        self.ip_deny.contains(&ip) || self.cidr_deny.iter().any(|net| net.contains(ip))
    }

    pub fn is_country_blocked(&self, country_code: &str) -> bool {
        self.country_deny.contains(&country_code.to_uppercase())
    }
}

/// In-memory snapshot cache kept coherent with the shared store via
/// [`invalidation`]. `reload()` is idempotent and safe to call concurrently:
/// an in-flight reload collapses further triggers into at most one
/// additional reload (run-then-recheck, spec §4.2).
pub struct PolicyCache {
    store: Arc<dyn Store>,
    snapshot: RwLock<Arc<PolicySnapshot>>,
    reload_state: tokio::sync::Mutex<ReloadState>,
}

#[derive(Default)]
struct ReloadState {
    in_flight: bool,
    pending_recheck: bool,
}

impl PolicyCache {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            snapshot: RwLock::new(Arc::new(PolicySnapshot::default())),
            reload_state: tokio::sync::Mutex::new(ReloadState::default()),
        }
    }

    /// Fetch all four sets and atomically install the resulting snapshot.
    /// Equivalent to `reload()`; kept as a separate name for startup clarity.
    pub async fn bootstrap(&self) -> Result<(), crate::store::StoreError> {
        self.reload().await
    }

    async fn fetch_and_install(&self) -> Result<(), crate::store::StoreError> {
        let ip_allow = self.store.smembers(KEY_ALLOW_IPS).await?;
        let ip_deny = self.store.smembers(KEY_DENY_IPS).await?;
        let cidr_deny = self.store.smembers(KEY_DENY_CIDRS).await?;
        let country_deny = self.store.smembers(KEY_DENY_COUNTRIES).await?;
        let snapshot = PolicySnapshot::from_raw(ip_allow, ip_deny, cidr_deny, country_deny);
        *self.snapshot.write().unwrap() = Arc::new(snapshot);
        Ok(())
    }

    /// Reload the snapshot from the shared store. If a reload fails the
    /// previous snapshot remains in effect (spec §4.2 failure semantics).
    pub async fn reload(&self) -> Result<(), crate::store::StoreError> {
        {
            let mut state = self.reload_state.lock().await;
            if state.in_flight {
                state.pending_recheck = true;
                return Ok(());
            }
            state.in_flight = true;
        }

        loop {
            let result = self.fetch_and_install().await;
            if let Err(e) = &result {
                warn!("policy cache reload failed, keeping previous snapshot: {e}");
            }

            let mut state = self.reload_state.lock().await;
            if state.pending_recheck {
                state.pending_recheck = false;
                drop(state);
                continue;
            }
            state.in_flight = false;
            return result;
        }
    }

    pub fn current(&self) -> Arc<PolicySnapshot> {
        self.snapshot.read().unwrap().clone()
    }

    pub fn is_allowlisted(&self, ip: IpAddr) -> bool {
        self.current().is_allowlisted(ip)
    }

    pub fn is_denylisted(&self, ip: IpAddr) -> bool {
        self.current().is_denylisted(ip)
    }

    pub fn is_country_blocked(&self, country_code: &str) -> bool {
        self.current().is_country_blocked(country_code)
    }
}

/// Minimal stand-in for the out-of-core admin CRUD controllers (spec §1, §6):
/// writes to the policy-list keys and publishes `invalidation` on success.
/// Full RBAC and request validation remain the caller's responsibility.
pub struct PolicyAdmin {
    store: Arc<dyn Store>,
}

impl PolicyAdmin {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    async fn publish_invalidation(&self) -> Result<(), crate::store::StoreError> {
        self.store
            .publish(INVALIDATION_CHANNEL, INVALIDATION_PAYLOAD)
            .await
    }

    async fn add(&self, key: &str, member: &str) -> Result<(), crate::store::StoreError> {
        self.store.sadd(key, member).await?;
        self.publish_invalidation().await
    }

    async fn remove(&self, key: &str, member: &str) -> Result<(), crate::store::StoreError> {
        self.store.srem(key, member).await?;
        self.publish_invalidation().await
    }

    pub async fn allow_ip(&self, ip: &str) -> Result<(), crate::store::StoreError> {
        self.add(KEY_ALLOW_IPS, ip).await
    }

    pub async fn unallow_ip(&self, ip: &str) -> Result<(), crate::store::StoreError> {
        self.remove(KEY_ALLOW_IPS, ip).await
    }

    pub async fn deny_ip(&self, ip: &str) -> Result<(), crate::store::StoreError> {
        self.add(KEY_DENY_IPS, ip).await
    }

    pub async fn undeny_ip(&self, ip: &str) -> Result<(), crate::store::StoreError> {
        self.remove(KEY_DENY_IPS, ip).await
    }

    pub async fn deny_cidr(&self, cidr: &str) -> Result<(), crate::store::StoreError> {
        self.add(KEY_DENY_CIDRS, cidr).await
    }

    pub async fn undeny_cidr(&self, cidr: &str) -> Result<(), crate::store::StoreError> {
        self.remove(KEY_DENY_CIDRS, cidr).await
    }

    pub async fn deny_country(&self, country: &str) -> Result<(), crate::store::StoreError> {
        self.add(KEY_DENY_COUNTRIES, &country.to_uppercase()).await
    }

    pub async fn undeny_country(&self, country: &str) -> Result<(), crate::store::StoreError> {
        self.remove(KEY_DENY_COUNTRIES, &country.to_uppercase()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    #[tokio::test]
    async fn allowlist_dominates_denylist() {
        let store = Arc::new(MemoryStore::new());
        store.seed_set(KEY_ALLOW_IPS, ["1.1.1.1".to_owned()]);
        store.seed_set(KEY_DENY_IPS, ["1.1.1.1".to_owned()]);
        let cache = PolicyCache::new(store);
        cache.bootstrap().await.unwrap();

        let ip: IpAddr = "1.1.1.1".parse().unwrap();
        assert!(cache.is_allowlisted(ip));
        assert!(cache.is_denylisted(ip));
    }

    #[tokio::test]
    async fn country_lookup_is_case_insensitive() {
        let store = Arc::new(MemoryStore::new());
        store.seed_set(KEY_DENY_COUNTRIES, ["ru".to_owned()]);
        let cache = PolicyCache::new(store);
        cache.bootstrap().await.unwrap();
        assert!(cache.is_country_blocked("RU"));
        assert!(cache.is_country_blocked("ru"));
    }

    #[tokio::test]
    async fn cidr_denylist_hit() {
        let store = Arc::new(MemoryStore::new());
        store.seed_set(KEY_DENY_CIDRS, ["10.0.0.0/8".to_owned()]);
        let cache = PolicyCache::new(store);
        cache.bootstrap().await.unwrap();
        assert!(cache.is_denylisted("10.0.5.7".parse().unwrap()));
        assert!(!cache.is_denylisted("11.0.5.7".parse().unwrap()));
    }

    #[tokio::test]
    async fn reload_restores_prior_state_after_add_then_remove() {
        let store = Arc::new(MemoryStore::new());
        let cache = PolicyCache::new(store.clone());
        cache.bootstrap().await.unwrap();
        let ip: IpAddr = "2.2.2.2".parse().unwrap();
        assert!(!cache.is_denylisted(ip));

        store.seed_set(KEY_DENY_IPS, ["2.2.2.2".to_owned()]);
        cache.reload().await.unwrap();
        assert!(cache.is_denylisted(ip));

        store.seed_set(KEY_DENY_IPS, Vec::<String>::new());
        cache.reload().await.unwrap();
        assert!(!cache.is_denylisted(ip));
    }
}
