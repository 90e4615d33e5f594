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

//! In-memory [`Store`] double used by unit tests so policy/reputation/
//! rate-limit logic can be exercised without a live Redis. Not used outside
//! `#[cfg(test)]` — production always wires [`super::redis_store::RedisStore`].

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::{LockOutcome, Store, StoreError};

struct Expiring<T> {
    value: T,
    expires_at: Option<Instant>,
}

impl<T> Expiring<T> {
    fn fresh(value: T) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_live(&self) -> bool {
        match self.expires_at {
            Some(at) => at > Instant::now(),
            None => true,
        }
    }
}

#[derive(Default)]
struct Inner {
    strings: HashMap<String, Expiring<String>>,
    sets: HashMap<String, Expiring<Vec<String>>>,
    hashes: HashMap<String, Expiring<HashMap<String, String>>>,
    channels: HashMap<String, broadcast::Sender<String>>,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Test helper: seed a set key directly (e.g. `geo:blocklist:cidrs`).
    pub fn seed_set(&self, key: &str, members: impl IntoIterator<Item = String>) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .sets
            .insert(key.to_owned(), Expiring::fresh(members.into_iter().collect()));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .sets
            .get(key)
            .filter(|e| e.is_live())
            .map(|e| e.value.clone())
            .unwrap_or_default())
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let live = inner.sets.get(key).is_some_and(|e| e.is_live());
        let entry = inner.sets.entry(key.to_owned()).or_insert_with(|| Expiring::fresh(Vec::new()));
        if !live {
            entry.value.clear();
            entry.expires_at = None;
        }
        if !entry.value.iter().any(|m| m == member) {
            entry.value.push(member.to_owned());
        }
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(e) = inner.sets.get_mut(key) {
            e.value.retain(|m| m != member);
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .strings
            .get(key)
            .filter(|e| e.is_live())
            .map(|e| e.value.clone()))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.strings.insert(
            key.to_owned(),
            Expiring {
                value: value.to_owned(),
                expires_at: Some(Instant::now() + Duration::from_secs(ttl_secs)),
            },
        );
        Ok(())
    }

    async fn set_nx_px(&self, key: &str, value: &str, ttl_ms: u64) -> Result<LockOutcome, StoreError> {
        let mut inner = self.lock();
        if inner.strings.get(key).is_some_and(|e| e.is_live()) {
            return Ok(LockOutcome::AlreadyHeld);
        }
        inner.strings.insert(
            key.to_owned(),
            Expiring {
                value: value.to_owned(),
                expires_at: Some(Instant::now() + Duration::from_millis(ttl_ms)),
            },
        );
        Ok(LockOutcome::Acquired)
    }

    async fn delete_if_eq(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let matches = inner
            .strings
            .get(key)
            .is_some_and(|e| e.is_live() && e.value == expected);
        if matches {
            inner.strings.remove(key);
        }
        Ok(matches)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .hashes
            .get(key)
            .filter(|e| e.is_live())
            .and_then(|e| e.value.get(field))
            .cloned())
    }

    async fn hset_multiple(&self, key: &str, fields: &[(&str, String)]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let live_existing = inner.hashes.get(key).is_some_and(|e| e.is_live());
        let entry = inner.hashes.entry(key.to_owned()).or_insert_with(|| Expiring::fresh(HashMap::new()));
        if !live_existing {
            entry.value.clear();
            entry.expires_at = None;
        }
        for (field, value) in fields {
            entry.value.insert((*field).to_owned(), value.clone());
        }
        Ok(())
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(e) = inner.hashes.get_mut(key) {
            e.expires_at = Some(Instant::now() + Duration::from_secs(ttl_secs));
        } else if let Some(e) = inner.strings.get_mut(key) {
            e.expires_at = Some(Instant::now() + Duration::from_secs(ttl_secs));
        }
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let inner = self.lock();
        let expires_at = inner
            .hashes
            .get(key)
            .and_then(|e| e.expires_at)
            .or_else(|| inner.strings.get(key).and_then(|e| e.expires_at));
        Ok(expires_at.map(|at| at.saturating_duration_since(Instant::now()).as_secs() as i64))
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        Ok(inner
            .hashes
            .get_mut(key)
            .is_some_and(|e| e.value.remove(field).is_some()))
    }

    async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .hashes
            .get(key)
            .filter(|e| e.is_live())
            .map(|e| e.value.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn incr_with_ttl_on_create(&self, key: &str, ttl_secs: u64) -> Result<i64, StoreError> {
        let mut inner = self.lock();
        let live = inner.strings.get(key).is_some_and(|e| e.is_live());
        let current: i64 = if live {
            inner.strings[key].value.parse().unwrap_or(0)
        } else {
            0
        };
        let next = current + 1;
        let expires_at = if live {
            inner.strings[key].expires_at
        } else {
            Some(Instant::now() + Duration::from_secs(ttl_secs))
        };
        inner.strings.insert(
            key.to_owned(),
            Expiring {
                value: next.to_string(),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn token_bucket_step(
        &self,
        key: &str,
        capacity: f64,
        refill_rate: f64,
        now_ms: i64,
        ttl_secs: u64,
    ) -> Result<(f64, i64, bool), StoreError> {
        let mut inner = self.lock();
        let live = inner.hashes.get(key).is_some_and(|e| e.is_live());
        let (tokens, last_refill): (f64, i64) = if live {
            let h = &inner.hashes[key].value;
            let tokens: f64 = h.get("tokens").and_then(|v| v.parse().ok()).unwrap_or(capacity);
            let last: i64 = h
                .get("lastRefillTime")
                .and_then(|v| v.parse().ok())
                .unwrap_or(now_ms);
            (tokens, last)
        } else {
            (capacity, now_ms)
        };

        let elapsed_secs = ((now_ms - last_refill).max(0) as f64) / 1000.0;
        let new_tokens = (tokens + elapsed_secs * refill_rate).min(capacity);

        let (final_tokens, consumed) = if new_tokens >= 1.0 {
            (new_tokens - 1.0, true)
        } else {
            (new_tokens, false)
        };

        let mut fields = HashMap::new();
        fields.insert("tokens".to_owned(), final_tokens.to_string());
        fields.insert("lastRefillTime".to_owned(), now_ms.to_string());
        inner.hashes.insert(
            key.to_owned(),
            Expiring {
                value: fields,
                expires_at: Some(Instant::now() + Duration::from_secs(ttl_secs)),
            },
        );

        Ok((final_tokens, now_ms, consumed))
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError> {
        let inner = self.lock();
        if let Some(tx) = inner.channels.get(channel) {
            let _ = tx.send(payload.to_owned());
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        channel: &str,
        on_message: Box<dyn Fn(String) + Send + Sync>,
    ) -> Result<(), StoreError> {
        let mut rx = {
            let mut inner = self.lock();
            let tx = inner
                .channels
                .entry(channel.to_owned())
                .or_insert_with(|| broadcast::channel(64).0)
                .clone();
            tx.subscribe()
        };
        while let Ok(payload) = rx.recv().await {
            on_message(payload);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn token_bucket_bound_holds_after_many_steps() {
        let store = MemoryStore::new();
        let mut now = 0i64;
        for _ in 0..50 {
            let (tokens, _, _) = store
                .token_bucket_step("bucket:a", 5.0, 1.0, now, 3600)
                .await
                .unwrap();
            assert!((0.0..=5.0).contains(&tokens));
            now += 100;
        }
    }

    #[tokio::test]
    async fn fixed_window_ttl_set_only_on_first_hit() {
        let store = MemoryStore::new();
        let n1 = store.incr_with_ttl_on_create("win:a", 60).await.unwrap();
        assert_eq!(n1, 1);
        let ttl1 = store.ttl("win:a").await.unwrap();
        assert!(ttl1.is_some());
        let n2 = store.incr_with_ttl_on_create("win:a", 60).await.unwrap();
        assert_eq!(n2, 2);
    }

    #[tokio::test]
    async fn lock_nx_then_held_then_cas_delete() {
        let store = MemoryStore::new();
        let first = store.set_nx_px("lock:a", "tok1", 10_000).await.unwrap();
        assert_eq!(first, LockOutcome::Acquired);
        let second = store.set_nx_px("lock:a", "tok2", 10_000).await.unwrap();
        assert_eq!(second, LockOutcome::AlreadyHeld);
        assert!(!store.delete_if_eq("lock:a", "tok2").await.unwrap());
        assert!(store.delete_if_eq("lock:a", "tok1").await.unwrap());
        let third = store.set_nx_px("lock:a", "tok3", 10_000).await.unwrap();
        assert_eq!(third, LockOutcome::Acquired);
    }
}
