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

//! Third-party IP reputation blocking with request coalescing (spec §4.4).
//! At most one external fetch is in flight per IP across all replicas; the
//! rest of the fleet rides the cached verdict or passes through while the
//! fetch is in flight.

pub mod adapters;

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::store::Store;
use adapters::AdapterSet;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReputationResult {
    pub score: Option<u8>,
    pub categories: Option<Vec<String>>,
    pub last_seen: Option<i64>,
    pub is_proxy: Option<bool>,
    pub is_tor: Option<bool>,
    pub is_vpn: Option<bool>,
}

pub type ReputationVerdict = Vec<ReputationResult>;

fn max_score(verdict: &ReputationVerdict) -> u8 {
    verdict.iter().filter_map(|r| r.score).max().unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Pass,
    Reject,
}

pub struct ReputationGate {
    store: Arc<dyn Store>,
    adapters: Arc<AdapterSet>,
    cache_ttl: Duration,
    lock_ttl: Duration,
    threshold: u8,
}

impl ReputationGate {
    pub fn new(
        store: Arc<dyn Store>,
        adapters: Arc<AdapterSet>,
        cache_ttl: Duration,
        lock_ttl: Duration,
        threshold: u8,
    ) -> Self {
        Self {
            store,
            adapters,
            cache_ttl,
            lock_ttl,
            threshold,
        }
    }

    fn cache_key(ip: IpAddr) -> String {
        format!("geo:reputation:{ip}")
    }

    fn lock_key(ip: IpAddr) -> String {
        format!("geo:lock:{ip}")
    }

    /// Implements the §4.4 algorithm. Missing IP is handled by the caller
    /// (ReputationGate itself never sees `None` — PolicyGate already rejected
    /// it); this function always receives a concrete address.
    pub async fn evaluate(&self, ip: IpAddr) -> Decision {
        match self.try_evaluate(ip).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!("reputation check failed open for {ip}: {e}");
                Decision::Pass
            }
        }
    }

    async fn try_evaluate(&self, ip: IpAddr) -> Result<Decision, crate::store::StoreError> {
        let cache_key = Self::cache_key(ip);

        if let Some(raw) = self.store.get(&cache_key).await? {
            let verdict: ReputationVerdict = serde_json::from_str(&raw).unwrap_or_default();
            return Ok(self.decide(&verdict));
        }

        let lock_key = Self::lock_key(ip);
        let token = format!("{}-{:x}", std::process::id(), rand::random::<u64>());
        let acquired = self
            .store
            .set_nx_px(&lock_key, &token, self.lock_ttl.as_millis() as u64)
            .await?;

        if acquired != crate::store::LockOutcome::Acquired {
            // another replica is refreshing; trade staleness for latency
            return Ok(Decision::Pass);
        }

        let verdict = self.adapters.check_all(ip).await;
        let serialized = serde_json::to_string(&verdict).unwrap_or_else(|_| "[]".to_owned());
        let write_result = self
            .store
            .set_ex(&cache_key, &serialized, self.cache_ttl.as_secs())
            .await;
        let _ = self.store.delete_if_eq(&lock_key, &token).await;
        write_result?;

        Ok(self.decide(&verdict))
    }

    fn decide(&self, verdict: &ReputationVerdict) -> Decision {
        if max_score(verdict) >= self.threshold {
            Decision::Reject
        } else {
            Decision::Pass
        }
    }
}

#[cfg(test)]
mod tests {
    use super::adapters::{AdapterSet, FakeAdapter};
    use super::*;
    use crate::store::memory::MemoryStore;

    fn gate(store: Arc<dyn Store>, scores: Vec<Option<u8>>, threshold: u8) -> ReputationGate {
        let adapters: Vec<Box<dyn adapters::ReputationAdapter>> = scores
            .into_iter()
            .map(|score| Box::new(FakeAdapter { score }) as Box<dyn adapters::ReputationAdapter>)
            .collect();
        ReputationGate::new(
            store,
            Arc::new(AdapterSet::new(adapters)),
            Duration::from_secs(60),
            Duration::from_millis(500),
            threshold,
        )
    }

    #[tokio::test]
    async fn cache_miss_fetches_and_caches() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let g = gate(store.clone(), vec![Some(10), Some(90)], 50);
        let ip: IpAddr = "1.2.3.4".parse().unwrap();

        assert_eq!(g.evaluate(ip).await, Decision::Reject);

        let raw = store.get(&ReputationGate::cache_key(ip)).await.unwrap();
        assert!(raw.is_some());
    }

    #[tokio::test]
    async fn cache_hit_skips_adapters() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let verdict: ReputationVerdict = vec![ReputationResult {
            score: Some(80),
            ..Default::default()
        }];
        store
            .set_ex(
                &ReputationGate::cache_key("5.6.7.8".parse().unwrap()),
                &serde_json::to_string(&verdict).unwrap(),
                60,
            )
            .await
            .unwrap();
        let g = gate(store, vec![], 50);
        let ip: IpAddr = "5.6.7.8".parse().unwrap();
        assert_eq!(g.evaluate(ip).await, Decision::Reject);
    }

    #[tokio::test]
    async fn below_threshold_passes() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let g = gate(store, vec![Some(10), Some(20)], 50);
        let ip: IpAddr = "9.9.9.9".parse().unwrap();
        assert_eq!(g.evaluate(ip).await, Decision::Pass);
    }

    #[tokio::test]
    async fn held_lock_yields_pass_without_adapter_call() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        store
            .set_nx_px(&ReputationGate::lock_key("4.4.4.4".parse().unwrap()), "other-token", 5_000)
            .await
            .unwrap();
        let g = gate(store, vec![Some(99)], 50);
        let ip: IpAddr = "4.4.4.4".parse().unwrap();
        assert_eq!(g.evaluate(ip).await, Decision::Pass);
    }

    #[tokio::test]
    async fn empty_verdict_scores_zero() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let g = gate(store, vec![], 1);
        let ip: IpAddr = "8.8.8.8".parse().unwrap();
        assert_eq!(g.evaluate(ip).await, Decision::Pass);
    }
}
