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

//! Fixed-window admission (spec §4.5.3): `INCR` plus `EXPIRE` on the first
//! hit in a window, backed by [`crate::store::Store::incr_with_ttl_on_create`].

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use super::{RateLimitError, Verdict};
use crate::store::Store;

pub struct FixedWindowStrategy {
    store: Arc<dyn Store>,
    key_prefix: String,
    header_prefix: String,
}

impl FixedWindowStrategy {
    pub fn new(store: Arc<dyn Store>, key_prefix: impl Into<String>, header_prefix: impl Into<String>) -> Self {
        Self {
            store,
            key_prefix: key_prefix.into(),
            header_prefix: header_prefix.into(),
        }
    }

    pub async fn check(
        &self,
        id: &str,
        limit: i64,
        window_secs: u64,
    ) -> Result<Verdict, RateLimitError> {
        if id.is_empty() {
            return Err(RateLimitError::MissingIdentifier);
        }
        if limit <= 0 || window_secs == 0 {
            return Err(RateLimitError::Misconfigured(format!(
                "limit={limit} windowSeconds={window_secs} must both be > 0"
            )));
        }

        let key = format!("{}{}", self.key_prefix, id);
        let n = self.store.incr_with_ttl_on_create(&key, window_secs).await?;
        let remaining_ttl = self.store.ttl(&key).await?;

        let mut headers = vec![
            Verdict::header(&self.header_prefix, "Limit", limit),
            Verdict::header(&self.header_prefix, "Remaining", (limit - n).max(0)),
        ];

        if let Some(ttl) = remaining_ttl.filter(|t| *t > 0) {
            let now_secs = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs() as i64;
            let reset = (now_secs as f64 + ttl as f64).floor() as i64;
            headers.push(Verdict::header(&self.header_prefix, "Reset", reset));
        }

        Ok(Verdict {
            admitted: n <= limit,
            headers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn strategy() -> FixedWindowStrategy {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        FixedWindowStrategy::new(store, "rl:window:", "X-Admin-RateLimit")
    }

    #[tokio::test]
    async fn admits_up_to_limit_then_rejects() {
        let s = strategy();
        for _ in 0..3 {
            assert!(s.check("k", 3, 60).await.unwrap().admitted);
        }
        assert!(!s.check("k", 3, 60).await.unwrap().admitted);
    }

    #[tokio::test]
    async fn ttl_set_only_on_first_increment() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let s = FixedWindowStrategy::new(store.clone(), "rl:window:", "X-RateLimit");
        s.check("k2", 5, 60).await.unwrap();
        let ttl_after_first = store.ttl("rl:window:k2").await.unwrap();
        assert!(ttl_after_first.is_some());
        s.check("k2", 5, 60).await.unwrap();
        let ttl_after_second = store.ttl("rl:window:k2").await.unwrap();
        assert!(ttl_after_second.is_some());
    }

    #[tokio::test]
    async fn empty_identifier_rejected() {
        let s = strategy();
        let err = s.check("", 1, 60).await.unwrap_err();
        assert!(matches!(err, RateLimitError::MissingIdentifier));
    }
}
