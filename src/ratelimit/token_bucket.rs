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

//! Token-bucket admission (spec §4.5.2). The refill/consume/persist step is
//! delegated to [`crate::store::Store::token_bucket_step`] so it runs as one
//! atomic round trip; this module only resolves parameters and renders
//! headers.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use super::{RateLimitError, Verdict};
use crate::store::Store;

pub struct TokenBucketStrategy {
    store: Arc<dyn Store>,
    key_prefix: String,
    header_prefix: String,
    ttl_secs: u64,
}

impl TokenBucketStrategy {
    pub fn new(store: Arc<dyn Store>, key_prefix: impl Into<String>, header_prefix: impl Into<String>) -> Self {
        Self {
            store,
            key_prefix: key_prefix.into(),
            header_prefix: header_prefix.into(),
            ttl_secs: 3600,
        }
    }

    pub fn with_ttl(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    /// Runs one admission step for `id` with the given `capacity`/`refill_rate`
    /// (spec §4.5.1: a missing/empty `id` is the caller's responsibility to
    /// reject before calling this; a non-positive capacity/rate is rejected
    /// here as server misconfiguration).
    pub async fn check(&self, id: &str, capacity: f64, refill_rate: f64) -> Result<Verdict, RateLimitError> {
        if id.is_empty() {
            return Err(RateLimitError::MissingIdentifier);
        }
        if capacity <= 0.0 || refill_rate <= 0.0 {
            return Err(RateLimitError::Misconfigured(format!(
                "capacity={capacity} refillRate={refill_rate} must both be > 0"
            )));
        }

        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;
        let key = format!("{}{}", self.key_prefix, id);

        let (final_tokens, _, consumed) = self
            .store
            .token_bucket_step(&key, capacity, refill_rate, now_ms, self.ttl_secs)
            .await?;

        // new_tokens is the post-refill, pre-consume balance; recoverable
        // from final_tokens since a successful step only ever subtracts 1.
        let new_tokens = if consumed { final_tokens + 1.0 } else { final_tokens };
        let now_secs = now_ms as f64 / 1000.0;

        let mut headers = vec![
            Verdict::header(&self.header_prefix, "Limit", capacity as i64),
            Verdict::header(
                &self.header_prefix,
                "Remaining",
                final_tokens.max(0.0).floor() as i64,
            ),
        ];

        if consumed {
            let reset = (now_secs + (capacity - new_tokens + 1.0) / refill_rate).ceil() as i64;
            headers.push(Verdict::header(&self.header_prefix, "Reset", reset));
            Ok(Verdict {
                admitted: true,
                headers,
            })
        } else {
            let reset = (now_secs + ((1.0 - new_tokens) / refill_rate).ceil()).floor() as i64;
            headers[1] = Verdict::header(&self.header_prefix, "Remaining", 0);
            headers.push(Verdict::header(&self.header_prefix, "Reset", reset));
            Ok(Verdict {
                admitted: false,
                headers,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn strategy() -> TokenBucketStrategy {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        TokenBucketStrategy::new(store, "rl:bucket:", "X-RateLimit")
    }

    #[tokio::test]
    async fn admits_within_capacity() {
        let s = strategy();
        let v = s.check("user-1", 3.0, 1.0).await.unwrap();
        assert!(v.admitted);
        assert!(v.headers.iter().any(|(k, v)| k == "X-RateLimit-Limit" && v == "3"));
    }

    #[tokio::test]
    async fn rejects_once_exhausted() {
        let s = strategy();
        for _ in 0..2 {
            assert!(s.check("user-2", 2.0, 0.001).await.unwrap().admitted);
        }
        let v = s.check("user-2", 2.0, 0.001).await.unwrap();
        assert!(!v.admitted);
        assert!(v.headers.iter().any(|(k, v)| k == "X-RateLimit-Remaining" && v == "0"));
    }

    #[tokio::test]
    async fn empty_identifier_rejected() {
        let s = strategy();
        let err = s.check("", 1.0, 1.0).await.unwrap_err();
        assert!(matches!(err, RateLimitError::MissingIdentifier));
    }

    #[tokio::test]
    async fn non_positive_params_are_misconfig() {
        let s = strategy();
        let err = s.check("user-3", 0.0, 1.0).await.unwrap_err();
        assert!(matches!(err, RateLimitError::Misconfigured(_)));
    }
}
