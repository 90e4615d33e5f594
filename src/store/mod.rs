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

//! Shared key-value store abstraction (spec §6 key schema, §5 connection model).
//!
//! Every stage that needs cross-replica state goes through the [`Store`]
//! trait rather than talking to `redis` directly, so the policy/reputation/
//! rate-limit logic can be unit tested against [`memory::MemoryStore`]
//! without a live Redis.

pub mod memory;
pub mod redis_store;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("shared store transport error: {0}")]
    Transport(String),
    #[error("shared store returned unexpected data for key {0:?}")]
    BadShape(String),
}

/// Outcome of a `SET key val NX PX ttl_ms` attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    Acquired,
    AlreadyHeld,
}

/// The command surface the gateway needs from a Redis-compatible store.
///
/// `key` and `field` arguments are always the *logical* key; implementations
/// are responsible for applying the configured key prefix.
#[async_trait]
pub trait Store: Send + Sync {
    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError>;
    async fn sadd(&self, key: &str, member: &str) -> Result<(), StoreError>;
    async fn srem(&self, key: &str, member: &str) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError>;

    /// `SET key value NX PX ttl_ms`. Returns whether *this* call acquired the lock.
    async fn set_nx_px(&self, key: &str, value: &str, ttl_ms: u64) -> Result<LockOutcome, StoreError>;
    /// Delete `key` only if its current value equals `expected` (compare-and-delete,
    /// spec §9's guidance on not releasing a lock you no longer own).
    async fn delete_if_eq(&self, key: &str, expected: &str) -> Result<bool, StoreError>;

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError>;
    async fn hset_multiple(&self, key: &str, fields: &[(&str, String)]) -> Result<(), StoreError>;
    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<(), StoreError>;
    async fn ttl(&self, key: &str) -> Result<Option<i64>, StoreError>;
    async fn hdel(&self, key: &str, field: &str) -> Result<bool, StoreError>;
    async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>, StoreError>;

    /// `INCR key`; sets `ttl_secs` only when this call created the key (spec §4.5.3).
    async fn incr_with_ttl_on_create(&self, key: &str, ttl_secs: u64) -> Result<i64, StoreError>;

    /// Atomic token-bucket step (spec §4.5.2, §9 "spec mandates atomic").
    /// Returns `(tokens_after, last_refill_ms, consumed)`.
    async fn token_bucket_step(
        &self,
        key: &str,
        capacity: f64,
        refill_rate: f64,
        now_ms: i64,
        ttl_secs: u64,
    ) -> Result<(f64, i64, bool), StoreError>;

    /// Publish `payload` on `channel`.
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError>;

    /// Subscribe to `channel` on a dedicated connection, invoking `on_message`
    /// for every payload received. Runs until the process shuts down; spec §5
    /// requires this connection is never shared with command traffic.
    async fn subscribe(
        &self,
        channel: &str,
        on_message: Box<dyn Fn(String) + Send + Sync>,
    ) -> Result<(), StoreError>;
}
