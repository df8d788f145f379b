//! Dual-backend fixed-window rate limiter
//!
//! Every check first tries the shared counter store; if it is missing, errors
//! or misses its deadline, the same key is counted in an in-process bucket.
//! The fallback is per instance, so limits are only global while the store is
//! reachable.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use sg_shared::config::RateLimitConfig;

use super::store::CounterStore;
use super::types::{RateLimitResult, RateWindow, RateWindowKey};

/// Default deadline for a single counter store call
const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(1);

/// In-process fallback counter
#[derive(Debug, Clone, Copy)]
struct LocalBucket {
    count: u64,
    reset_at: Instant,
}

/// Layered rate limiter for OTP issuance and API usage
pub struct RateLimiter {
    config: RateLimitConfig,
    store: Option<Arc<dyn CounterStore>>,
    store_timeout: Duration,
    local: Mutex<HashMap<String, LocalBucket>>,
}

impl RateLimiter {
    /// Create a limiter; without a store every check uses local buckets
    pub fn new(config: RateLimitConfig, store: Option<Arc<dyn CounterStore>>) -> Self {
        Self {
            config,
            store,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            local: Mutex::new(HashMap::new()),
        }
    }

    /// Override the deadline for counter store calls
    pub fn with_store_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Count one hit against `key` and decide whether it fits in `limit`
    pub async fn check_limit(&self, key: &str, limit: u32, window: Duration) -> RateLimitResult {
        if !self.config.enabled {
            return RateLimitResult::unlimited();
        }

        if let Some(store) = &self.store {
            match timeout(self.store_timeout, store.increment_with_expiry(key, window)).await {
                Ok(Ok(snapshot)) => {
                    return RateLimitResult::from_count(key, snapshot.count, limit, snapshot.ttl);
                }
                Ok(Err(e)) => {
                    warn!(event = "rate_limit_fallback", error = %e, "Counter store failed, using local bucket");
                }
                Err(_) => {
                    warn!(event = "rate_limit_fallback", "Counter store timed out, using local bucket");
                }
            }
        }

        self.check_local(key, limit, window).await
    }

    /// Per-user minute and hour limits, then the per-phone daily limit
    ///
    /// Without a user id the minute and hour layers are keyed on the phone.
    pub async fn check_otp(&self, user_id: Option<&str>, phone: &str) -> RateLimitResult {
        if !self.config.enabled {
            return RateLimitResult::unlimited();
        }

        let short_key = |window| match user_id {
            Some(user_id) => RateWindowKey::otp_user(user_id, window),
            None => RateWindowKey::otp_phone(phone, window),
        };

        let layers = [
            (short_key(RateWindow::Minute), self.config.otp_per_minute),
            (short_key(RateWindow::Hour), self.config.otp_per_hour),
            (
                RateWindowKey::otp_phone(phone, RateWindow::Day),
                self.config.otp_per_phone_per_day,
            ),
        ];

        self.check_layers(&layers).await
    }

    /// Per-key minute, hour and day limits
    pub async fn check_api(&self, api_key: &str) -> RateLimitResult {
        if !self.config.enabled {
            return RateLimitResult::unlimited();
        }

        let layers = [
            (
                RateWindowKey::api_key(api_key, RateWindow::Minute),
                self.config.default_per_minute,
            ),
            (
                RateWindowKey::api_key(api_key, RateWindow::Hour),
                self.config.default_per_hour,
            ),
            (
                RateWindowKey::api_key(api_key, RateWindow::Day),
                self.config.default_per_day,
            ),
        ];

        self.check_layers(&layers).await
    }

    /// Clear a counter in both backends
    pub async fn reset(&self, key: &str) {
        self.local.lock().await.remove(key);

        if let Some(store) = &self.store {
            match timeout(self.store_timeout, store.delete(key)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Failed to reset distributed counter"),
                Err(_) => warn!("Timed out resetting distributed counter"),
            }
        }
    }

    /// Current count for `key` without incrementing it
    pub async fn get_usage(&self, key: &str) -> u64 {
        if let Some(store) = &self.store {
            match timeout(self.store_timeout, store.get_count(key)).await {
                Ok(Ok(count)) => return count,
                Ok(Err(e)) => warn!(error = %e, "Counter store failed, reading local bucket"),
                Err(_) => warn!("Counter store timed out, reading local bucket"),
            }
        }

        let local = self.local.lock().await;
        match local.get(key) {
            Some(bucket) if bucket.reset_at > Instant::now() => bucket.count,
            _ => 0,
        }
    }

    /// Drop expired local buckets; returns how many were removed
    pub async fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut local = self.local.lock().await;
        let before = local.len();
        local.retain(|_, bucket| bucket.reset_at > now);
        let removed = before - local.len();
        if removed > 0 {
            debug!(removed, remaining = local.len(), "Expired rate limit buckets removed");
        }
        removed
    }

    /// Run [`cleanup`](Self::cleanup) periodically until the limiter is dropped
    pub fn start_cleanup_task(self: &Arc<Self>) -> JoinHandle<()> {
        let limiter: Weak<Self> = Arc::downgrade(self);
        let period = Duration::from_secs(self.config.cleanup_interval_seconds.max(1));

        tokio::spawn(async move {
            info!(interval_secs = period.as_secs(), "Rate limit cleanup started");

            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                match limiter.upgrade() {
                    Some(limiter) => {
                        limiter.cleanup().await;
                    }
                    None => break,
                }
            }
        })
    }

    async fn check_layers(&self, layers: &[(RateWindowKey, u32)]) -> RateLimitResult {
        let mut tightest: Option<RateLimitResult> = None;

        for (key, limit) in layers {
            let result = self
                .check_limit(&key.to_string(), *limit, key.window.duration())
                .await;

            if !result.allowed {
                warn!(
                    event = "rate_limited",
                    scope = key.scope,
                    subject = key.subject_type,
                    window = key.window.as_str(),
                    limit,
                    retry_after_secs = result.retry_after_seconds(),
                    "Rate limit exceeded"
                );
                return result;
            }

            let tighter = match &tightest {
                Some(current) => result.remaining < current.remaining,
                None => true,
            };
            if tighter {
                tightest = Some(result);
            }
        }

        tightest.unwrap_or_else(RateLimitResult::unlimited)
    }

    async fn check_local(&self, key: &str, limit: u32, window: Duration) -> RateLimitResult {
        let now = Instant::now();
        let mut local = self.local.lock().await;

        let bucket = local.entry(key.to_string()).or_insert(LocalBucket {
            count: 0,
            reset_at: now + window,
        });
        if bucket.reset_at <= now {
            *bucket = LocalBucket {
                count: 0,
                reset_at: now + window,
            };
        }
        bucket.count += 1;

        RateLimitResult::from_count(key, bucket.count, limit, bucket.reset_at - now)
    }
}
