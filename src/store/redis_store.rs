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

//! Redis-backed [`Store`] implementation. Two connections per spec §5: a
//! [`redis::aio::ConnectionManager`] (auto-reconnecting, safe to clone and
//! share) for commands, and a fresh dedicated connection per [`subscribe`]
//! call for pub/sub, since a subscribed connection cannot issue commands.

use async_trait::async_trait;
use futures::StreamExt;
use redis::{AsyncCommands, Client, Script, aio::ConnectionManager};

use super::{LockOutcome, Store, StoreError};

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        StoreError::Transport(e.to_string())
    }
}

/// Lua script implementing the atomic token-bucket step (spec §4.5.2, §9).
/// `KEYS[1]` = bucket key. `ARGV`: capacity, refill_rate, now_ms, ttl_secs.
/// Returns `[final_tokens, consumed]` as strings.
static TOKEN_BUCKET_SCRIPT: &str = r#"
local tokens = tonumber(redis.call('HGET', KEYS[1], 'tokens'))
local last = tonumber(redis.call('HGET', KEYS[1], 'lastRefillTime'))
local capacity = tonumber(ARGV[1])
local refill_rate = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local ttl = tonumber(ARGV[4])

if tokens == nil or last == nil then
  tokens = capacity
  last = now
end

local elapsed = (now - last) / 1000
if elapsed < 0 then elapsed = 0 end
local new_tokens = tokens + elapsed * refill_rate
if new_tokens > capacity then new_tokens = capacity end

local consumed = 0
local final_tokens = new_tokens
if new_tokens >= 1 then
  consumed = 1
  final_tokens = new_tokens - 1
end

redis.call('HSET', KEYS[1], 'tokens', tostring(final_tokens), 'lastRefillTime', tostring(now))
redis.call('EXPIRE', KEYS[1], ttl)

return {tostring(final_tokens), tostring(consumed)}
"#;

/// Compare-and-delete, so a lock holder never releases a lock taken by a
/// later owner after its own TTL expired (spec §9).
static CAS_DELETE_SCRIPT: &str = r#"
local v = redis.call('GET', KEYS[1])
if v == ARGV[1] then
  redis.call('DEL', KEYS[1])
  return 1
end
return 0
"#;

static INCR_TTL_ON_CREATE_SCRIPT: &str = r#"
local n = redis.call('INCR', KEYS[1])
if n == 1 then
  redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return n
"#;

pub struct RedisStore {
    cmd: ConnectionManager,
    pubsub_client: Client,
    prefix: String,
    token_bucket_script: Script,
    cas_delete_script: Script,
    incr_ttl_script: Script,
}

impl RedisStore {
    pub async fn connect(url: &str, prefix: String) -> Result<Self, StoreError> {
        let client = Client::open(url).map_err(|e| StoreError::Transport(e.to_string()))?;
        let cmd = ConnectionManager::new(client.clone()).await?;
        Ok(Self {
            cmd,
            pubsub_client: client,
            prefix,
            token_bucket_script: Script::new(TOKEN_BUCKET_SCRIPT),
            cas_delete_script: Script::new(CAS_DELETE_SCRIPT),
            incr_ttl_script: Script::new(INCR_TTL_ON_CREATE_SCRIPT),
        })
    }

    fn k(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.cmd.clone();
        Ok(conn.smembers(self.k(key)).await?)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.cmd.clone();
        let _: i64 = conn.sadd(self.k(key), member).await?;
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.cmd.clone();
        let _: i64 = conn.srem(self.k(key), member).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.cmd.clone();
        Ok(conn.get(self.k(key)).await?)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        let mut conn = self.cmd.clone();
        let _: () = conn.set_ex(self.k(key), value, ttl_secs).await?;
        Ok(())
    }

    async fn set_nx_px(&self, key: &str, value: &str, ttl_ms: u64) -> Result<LockOutcome, StoreError> {
        let mut conn = self.cmd.clone();
        let opts = redis::SetOptions::default()
            .conditional_set(redis::ExistenceCheck::NX)
            .with_expiration(redis::SetExpiry::PX(ttl_ms as usize));
        let res: Option<String> = conn.set_options(self.k(key), value, opts).await?;
        Ok(if res.is_some() {
            LockOutcome::Acquired
        } else {
            LockOutcome::AlreadyHeld
        })
    }

    async fn delete_if_eq(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let mut conn = self.cmd.clone();
        let res: i64 = self
            .cas_delete_script
            .key(self.k(key))
            .arg(expected)
            .invoke_async(&mut conn)
            .await?;
        Ok(res == 1)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.cmd.clone();
        Ok(conn.hget(self.k(key), field).await?)
    }

    async fn hset_multiple(&self, key: &str, fields: &[(&str, String)]) -> Result<(), StoreError> {
        let mut conn = self.cmd.clone();
        let _: () = conn.hset_multiple(self.k(key), fields).await?;
        Ok(())
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<(), StoreError> {
        let mut conn = self.cmd.clone();
        let _: () = conn.expire(self.k(key), ttl_secs as i64).await?;
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let mut conn = self.cmd.clone();
        let t: i64 = conn.ttl(self.k(key)).await?;
        Ok(if t < 0 { None } else { Some(t) })
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        let mut conn = self.cmd.clone();
        let n: i64 = conn.hdel(self.k(key), field).await?;
        Ok(n > 0)
    }

    async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>, StoreError> {
        let mut conn = self.cmd.clone();
        Ok(conn.hgetall(self.k(key)).await?)
    }

    async fn incr_with_ttl_on_create(&self, key: &str, ttl_secs: u64) -> Result<i64, StoreError> {
        let mut conn = self.cmd.clone();
        let n: i64 = self
            .incr_ttl_script
            .key(self.k(key))
            .arg(ttl_secs)
            .invoke_async(&mut conn)
            .await?;
        Ok(n)
    }

    async fn token_bucket_step(
        &self,
        key: &str,
        capacity: f64,
        refill_rate: f64,
        now_ms: i64,
        ttl_secs: u64,
    ) -> Result<(f64, i64, bool), StoreError> {
        let mut conn = self.cmd.clone();
        let (tokens_str, consumed_str): (String, String) = self
            .token_bucket_script
            .key(self.k(key))
            .arg(capacity)
            .arg(refill_rate)
            .arg(now_ms)
            .arg(ttl_secs)
            .invoke_async(&mut conn)
            .await?;
        let tokens: f64 = tokens_str
            .parse()
            .map_err(|_| StoreError::BadShape(key.to_owned()))?;
        let consumed = consumed_str == "1";
        Ok((tokens, now_ms, consumed))
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError> {
        let mut conn = self.cmd.clone();
        let _: i64 = conn.publish(channel, payload).await?;
        Ok(())
    }

    async fn subscribe(
        &self,
        channel: &str,
        on_message: Box<dyn Fn(String) + Send + Sync>,
    ) -> Result<(), StoreError> {
        let mut pubsub = self
            .pubsub_client
            .get_async_pubsub()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        let mut stream = pubsub.on_message();
        while let Some(msg) = stream.next().await {
            if let Ok(payload) = msg.get_payload::<String>() {
                on_message(payload);
            }
        }
        Ok(())
    }
}
