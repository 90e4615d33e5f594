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

//! Per-API-key token-bucket overrides (spec §4.5.4). Consulted by the
//! `api-key` scope on every request to resolve `capacity`/`refillRate`.

use std::sync::Arc;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::store::{Store, StoreError};

const CONFIG_KEY: &str = "rl:config";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitConfig {
    pub capacity: f64,
    pub refill_rate: f64,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_default: bool,
}

pub struct RateLimitConfigStore {
    store: Arc<dyn Store>,
    defaults: RateLimitConfig,
}

impl RateLimitConfigStore {
    pub fn new(store: Arc<dyn Store>, defaults: RateLimitConfig) -> Self {
        Self { store, defaults }
    }

    pub async fn update(&self, api_key: &str, capacity: f64, refill_rate: f64) -> Result<(), StoreError> {
        if capacity <= 0.0 || refill_rate <= 0.0 {
            return Err(StoreError::BadShape(format!(
                "capacity={capacity} refillRate={refill_rate} must both be > 0"
            )));
        }
        let value = RateLimitConfig {
            capacity,
            refill_rate,
            is_default: false,
        };
        let json = serde_json::to_string(&value).expect("RateLimitConfig serializes");
        self.store
            .hset_multiple(CONFIG_KEY, &[(api_key, json)])
            .await
    }

    /// Returns the stored config, or [`Self::defaults`] with `is_default: true`
    /// set. A corrupt stored value is treated the same as "absent" and logged.
    pub async fn get(&self, api_key: &str) -> Result<RateLimitConfig, StoreError> {
        match self.store.hget(CONFIG_KEY, api_key).await? {
            Some(raw) => match serde_json::from_str::<RateLimitConfig>(&raw) {
                Ok(mut cfg) => {
                    cfg.is_default = false;
                    Ok(cfg)
                }
                Err(e) => {
                    warn!("corrupt rate-limit config for api key {api_key:?}: {e}");
                    Ok(self.defaults_marked())
                }
            },
            None => Ok(self.defaults_marked()),
        }
    }

    fn defaults_marked(&self) -> RateLimitConfig {
        RateLimitConfig {
            is_default: true,
            ..self.defaults
        }
    }

    pub async fn delete(&self, api_key: &str) -> Result<bool, StoreError> {
        self.store.hdel(CONFIG_KEY, api_key).await
    }

    pub async fn list(&self) -> Result<Vec<(String, RateLimitConfig)>, StoreError> {
        let fields = self.store.hgetall(CONFIG_KEY).await?;
        Ok(fields
            .into_iter()
            .filter_map(|(key, raw)| match serde_json::from_str::<RateLimitConfig>(&raw) {
                Ok(mut cfg) => {
                    cfg.is_default = false;
                    Some((key, cfg))
                }
                Err(e) => {
                    warn!("skipping corrupt rate-limit config for api key {key:?}: {e}");
                    None
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn config_store() -> RateLimitConfigStore {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        RateLimitConfigStore::new(
            store,
            RateLimitConfig {
                capacity: 10.0,
                refill_rate: 1.0,
                is_default: false,
            },
        )
    }

    #[tokio::test]
    async fn missing_key_returns_defaults() {
        let s = config_store();
        let cfg = s.get("unknown").await.unwrap();
        assert!(cfg.is_default);
        assert_eq!(cfg.capacity, 10.0);
    }

    #[tokio::test]
    async fn update_then_get_round_trips() {
        let s = config_store();
        s.update("key-a", 50.0, 5.0).await.unwrap();
        let cfg = s.get("key-a").await.unwrap();
        assert!(!cfg.is_default);
        assert_eq!(cfg.capacity, 50.0);
        assert_eq!(cfg.refill_rate, 5.0);
    }

    #[tokio::test]
    async fn delete_reports_whether_present() {
        let s = config_store();
        s.update("key-b", 1.0, 1.0).await.unwrap();
        assert!(s.delete("key-b").await.unwrap());
        assert!(!s.delete("key-b").await.unwrap());
    }

    #[tokio::test]
    async fn update_rejects_non_positive() {
        let s = config_store();
        assert!(s.update("key-c", 0.0, 1.0).await.is_err());
    }

    #[tokio::test]
    async fn list_skips_corrupt_entries() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        store
            .hset_multiple(CONFIG_KEY, &[("good", r#"{"capacity":1.0,"refillRate":1.0}"#.to_owned())])
            .await
            .unwrap();
        store
            .hset_multiple(CONFIG_KEY, &[("bad", "not json".to_owned())])
            .await
            .unwrap();
        let s = RateLimitConfigStore::new(
            store,
            RateLimitConfig {
                capacity: 1.0,
                refill_rate: 1.0,
                is_default: false,
            },
        );
        let list = s.list().await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].0, "good");
    }
}
