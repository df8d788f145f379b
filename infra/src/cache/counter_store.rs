//! Redis-backed fixed-window counters for the rate limiter

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use redis::Script;
use tracing::debug;

use sg_core::errors::{DomainError, DomainResult};
use sg_core::services::rate_limit::{CounterSnapshot, CounterStore};

use crate::cache::RedisClient;
use crate::InfrastructureError;

/// Namespace for rate limit counters
const COUNTER_KEY_PREFIX: &str = "ratelimit";

/// INCR, arm the expiry on first hit, report the remaining TTL
///
/// A counter that somehow lost its expiry is re-armed so it cannot stick.
static INCREMENT_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
local ttl = redis.call('PTTL', KEYS[1])
if ttl < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
    ttl = tonumber(ARGV[1])
end
return {count, ttl}
"#,
    )
});

/// Rate limit counters shared by every gateway instance
pub struct RedisCounterStore {
    client: RedisClient,
}

impl RedisCounterStore {
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }

    fn counter_key(&self, key: &str) -> String {
        self.client
            .make_key(&format!("{}:{}", COUNTER_KEY_PREFIX, key))
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment_with_expiry(
        &self,
        key: &str,
        window: Duration,
    ) -> DomainResult<CounterSnapshot> {
        let redis_key = self.counter_key(key);
        let redis_key = redis_key.as_str();
        let window_ms = window.as_millis().max(1) as u64;

        let (count, ttl_ms): (i64, i64) = self
            .client
            .execute_with_retry("rate_limit_incr", move |mut conn| async move {
                INCREMENT_SCRIPT
                    .key(redis_key)
                    .arg(window_ms)
                    .invoke_async(&mut conn)
                    .await
            })
            .await
            .map_err(InfrastructureError::from)?;

        debug!(key = %redis_key, count, ttl_ms, "Rate limit counter incremented");

        Ok(CounterSnapshot {
            count: count.max(0) as u64,
            ttl: Duration::from_millis(ttl_ms.max(0) as u64),
        })
    }

    async fn get_count(&self, key: &str) -> DomainResult<u64> {
        let value = self
            .client
            .get(&self.counter_key(key))
            .await
            .map_err(InfrastructureError::from)?;

        match value {
            None => Ok(0),
            Some(raw) => raw.parse::<u64>().map_err(|e| {
                DomainError::storage(format!("Corrupt rate limit counter {}: {}", key, e))
            }),
        }
    }

    async fn delete(&self, key: &str) -> DomainResult<()> {
        self.client
            .delete(&self.counter_key(key))
            .await
            .map_err(InfrastructureError::from)?;
        Ok(())
    }
}
