//! Redis client with connection management and retry logic

use std::future::Future;
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError, RedisResult};
use tracing::{debug, info, warn};

use sg_shared::config::CacheConfig;

use crate::InfrastructureError;

/// Redis client wrapper around a self-reconnecting connection manager
#[derive(Clone)]
pub struct RedisClient {
    connection: ConnectionManager,
    config: CacheConfig,
}

impl RedisClient {
    /// Connect to the configured Redis server
    ///
    /// Fails when no URL is configured, the URL is malformed or the server
    /// cannot be reached within `connection_timeout` seconds.
    pub async fn new(config: CacheConfig) -> Result<Self, InfrastructureError> {
        let url = config
            .url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| InfrastructureError::Config("Redis URL is not configured".to_string()))?;

        let client = redis::Client::open(url.as_str())?;
        let connect_timeout = Duration::from_secs(config.connection_timeout.max(1));

        let connection = tokio::time::timeout(connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| {
                InfrastructureError::Config(format!(
                    "Timed out connecting to Redis at {}",
                    mask_url(&url)
                ))
            })??;

        info!(url = %mask_url(&url), "Connected to Redis");

        Ok(Self { connection, config })
    }

    /// A handle to the shared connection
    pub fn get_connection(&self) -> ConnectionManager {
        self.connection.clone()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Apply the configured key prefix
    pub fn make_key(&self, key: &str) -> String {
        self.config.make_key(key)
    }

    /// Run `op` until it succeeds, fails permanently or retries run out
    ///
    /// Only I/O level failures are retried, with a linearly growing delay.
    pub async fn execute_with_retry<T, F, Fut>(&self, operation: &str, mut op: F) -> RedisResult<T>
    where
        F: FnMut(ConnectionManager) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let max_attempts = self.config.max_retries.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match op(self.get_connection()).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < max_attempts && is_retriable_error(&e) => {
                    let delay = Duration::from_millis(self.config.retry_delay_ms * attempt as u64);
                    warn!(
                        operation,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Redis operation failed, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Get a string value
    pub async fn get(&self, key: &str) -> RedisResult<Option<String>> {
        self.execute_with_retry("get", move |mut conn| async move {
            conn.get::<_, Option<String>>(key).await
        })
        .await
    }

    /// Set a string value with a TTL in seconds
    pub async fn set_with_expiry(&self, key: &str, value: &str, seconds: u64) -> RedisResult<()> {
        self.execute_with_retry("set_ex", move |mut conn| async move {
            conn.set_ex::<_, _, ()>(key, value, seconds).await
        })
        .await
    }

    /// Delete a key, returning whether it existed
    pub async fn delete(&self, key: &str) -> RedisResult<bool> {
        let removed: i64 = self
            .execute_with_retry("del", move |mut conn| async move {
                conn.del::<_, i64>(key).await
            })
            .await?;
        Ok(removed > 0)
    }

    /// PING the server
    pub async fn health_check(&self) -> RedisResult<bool> {
        let pong: String = redis::cmd("PING")
            .query_async(&mut self.get_connection())
            .await?;
        debug!(response = %pong, "Redis health check");
        Ok(pong == "PONG")
    }
}

/// Hide credentials in a Redis URL for logging
pub fn mask_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}****{}", &url[..scheme_end + 3], &url[at..])
        }
        _ => url.to_string(),
    }
}

/// Whether an error is worth retrying on a fresh attempt
pub fn is_retriable_error(error: &RedisError) -> bool {
    error.is_io_error()
        || error.is_timeout()
        || error.is_connection_dropped()
        || error.is_connection_refusal()
}
