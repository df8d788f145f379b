//! Unit tests for the rate limiter

use std::sync::Arc;
use std::time::Duration;

use sg_shared::config::RateLimitConfig;

use super::mocks::MockCounterStore;
use crate::services::rate_limit::{CounterStore, RateLimiter};

const PHONE: &str = "+15551234567";

fn local_limiter(config: RateLimitConfig) -> RateLimiter {
    RateLimiter::new(config, None)
}

fn store_limiter(config: RateLimitConfig, store: Arc<MockCounterStore>) -> RateLimiter {
    RateLimiter::new(config, Some(store as Arc<dyn CounterStore>))
}

async fn assert_window_behaviour(limiter: &RateLimiter) {
    for expected_remaining in (0..5).rev() {
        let result = limiter.check_limit("test:key", 5, Duration::from_secs(1)).await;
        assert!(result.allowed);
        assert_eq!(result.remaining, Some(expected_remaining));
    }

    let sixth = limiter.check_limit("test:key", 5, Duration::from_secs(1)).await;
    assert!(!sixth.allowed);
    assert_eq!(sixth.remaining, Some(0));
    assert!(sixth.retry_after.is_some());

    tokio::time::advance(Duration::from_secs(1)).await;

    let fresh = limiter.check_limit("test:key", 5, Duration::from_secs(1)).await;
    assert!(fresh.allowed);
    assert_eq!(fresh.remaining, Some(4));
}

#[tokio::test(start_paused = true)]
async fn test_local_window_resets_after_expiry() {
    let limiter = local_limiter(RateLimitConfig::default());
    assert_window_behaviour(&limiter).await;
}

#[tokio::test(start_paused = true)]
async fn test_store_window_resets_after_expiry() {
    let store = Arc::new(MockCounterStore::new());
    let limiter = store_limiter(RateLimitConfig::default(), store.clone());

    assert_window_behaviour(&limiter).await;
    assert_eq!(store.call_count(), 7);
}

#[tokio::test(start_paused = true)]
async fn test_failing_store_falls_back_to_local() {
    let store = Arc::new(MockCounterStore::failing());
    let limiter = store_limiter(RateLimitConfig::default(), store.clone());

    assert_window_behaviour(&limiter).await;
    // The store is still tried on every check
    assert_eq!(store.call_count(), 7);
}

#[tokio::test(start_paused = true)]
async fn test_slow_store_falls_back_to_local() {
    let store = Arc::new(MockCounterStore::slow(Duration::from_secs(5)));
    let limiter = store_limiter(RateLimitConfig::default(), store)
        .with_store_timeout(Duration::from_millis(100));

    let result = limiter.check_limit("slow:key", 1, Duration::from_secs(60)).await;
    assert!(result.allowed);
    assert_eq!(limiter.get_usage("slow:key").await, 1);
}

#[tokio::test]
async fn test_disabled_limiter_never_touches_store() {
    let store = Arc::new(MockCounterStore::new());
    let limiter = store_limiter(RateLimitConfig::disabled(), store.clone());

    for _ in 0..100 {
        let result = limiter.check_otp(Some("u1"), PHONE).await;
        assert!(result.allowed);
        assert!(result.is_unlimited());
    }
    assert!(limiter.check_api("key").await.is_unlimited());
    assert!(limiter.check_limit("k", 1, Duration::from_secs(1)).await.is_unlimited());
    assert_eq!(store.call_count(), 0);
}

#[tokio::test]
async fn test_check_otp_reports_binding_minute_layer() {
    let limiter = local_limiter(RateLimitConfig {
        otp_per_minute: 1,
        otp_per_hour: 10,
        otp_per_phone_per_day: 5,
        ..Default::default()
    });

    assert!(limiter.check_otp(Some("u1"), PHONE).await.allowed);

    let rejected = limiter.check_otp(Some("u1"), PHONE).await;
    assert!(!rejected.allowed);
    assert_eq!(rejected.key.as_deref(), Some("otp:user:u1:minute"));
    assert_eq!(rejected.limit, 1);
    assert!(rejected.retry_after.unwrap() <= Duration::from_secs(60));

    // Later layers were not evaluated for the rejected call
    let day_key = format!("otp:phone:{}:day", PHONE);
    assert_eq!(limiter.get_usage(&day_key).await, 1);
    assert_eq!(limiter.get_usage("otp:user:u1:hour").await, 1);
}

#[tokio::test]
async fn test_check_otp_reports_binding_phone_day_layer() {
    let limiter = local_limiter(RateLimitConfig {
        otp_per_minute: 10,
        otp_per_hour: 10,
        otp_per_phone_per_day: 2,
        ..Default::default()
    });

    assert!(limiter.check_otp(Some("u1"), PHONE).await.allowed);
    assert!(limiter.check_otp(Some("u2"), PHONE).await.allowed);

    let rejected = limiter.check_otp(Some("u3"), PHONE).await;
    assert!(!rejected.allowed);
    assert_eq!(rejected.key, Some(format!("otp:phone:{}:day", PHONE)));
    assert_eq!(rejected.limit, 2);
    assert!(rejected.retry_after.unwrap() > Duration::from_secs(3600));

    // Another phone is unaffected
    assert!(limiter.check_otp(Some("u3"), "+15557654321").await.allowed);
}

#[tokio::test]
async fn test_check_otp_without_user_keys_on_phone() {
    let limiter = local_limiter(RateLimitConfig {
        otp_per_minute: 1,
        ..Default::default()
    });

    assert!(limiter.check_otp(None, PHONE).await.allowed);
    let rejected = limiter.check_otp(None, PHONE).await;
    assert_eq!(rejected.key, Some(format!("otp:phone:{}:minute", PHONE)));
}

#[tokio::test]
async fn test_allowed_layered_check_returns_tightest_layer() {
    let limiter = local_limiter(RateLimitConfig {
        default_per_minute: 30,
        default_per_hour: 2,
        default_per_day: 5000,
        ..Default::default()
    });

    let result = limiter.check_api("key-1").await;
    assert!(result.allowed);
    assert_eq!(result.key.as_deref(), Some("api:key:key-1:hour"));
    assert_eq!(result.remaining, Some(1));

    limiter.check_api("key-1").await;
    let rejected = limiter.check_api("key-1").await;
    assert!(!rejected.allowed);
    assert_eq!(rejected.key.as_deref(), Some("api:key:key-1:hour"));
}

#[tokio::test]
async fn test_reset_clears_both_backends() {
    let store = Arc::new(MockCounterStore::new());
    let limiter = store_limiter(RateLimitConfig::default(), store.clone());

    limiter.check_limit("reset:key", 1, Duration::from_secs(60)).await;
    assert!(!limiter.check_limit("reset:key", 1, Duration::from_secs(60)).await.allowed);
    assert_eq!(limiter.get_usage("reset:key").await, 2);

    limiter.reset("reset:key").await;
    assert_eq!(limiter.get_usage("reset:key").await, 0);
    assert!(limiter.check_limit("reset:key", 1, Duration::from_secs(60)).await.allowed);
}

#[tokio::test(start_paused = true)]
async fn test_get_usage_ignores_expired_local_bucket() {
    let limiter = local_limiter(RateLimitConfig::default());
    assert_eq!(limiter.get_usage("usage:key").await, 0);

    limiter.check_limit("usage:key", 10, Duration::from_secs(5)).await;
    limiter.check_limit("usage:key", 10, Duration::from_secs(5)).await;
    assert_eq!(limiter.get_usage("usage:key").await, 2);

    tokio::time::advance(Duration::from_secs(5)).await;
    assert_eq!(limiter.get_usage("usage:key").await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_removes_only_expired_buckets() {
    let limiter = local_limiter(RateLimitConfig::default());
    limiter.check_limit("short", 10, Duration::from_secs(1)).await;
    limiter.check_limit("long", 10, Duration::from_secs(3600)).await;

    assert_eq!(limiter.cleanup().await, 0);

    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(limiter.cleanup().await, 1);
    assert_eq!(limiter.get_usage("long").await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_background_cleanup_task() {
    let limiter = Arc::new(local_limiter(RateLimitConfig {
        cleanup_interval_seconds: 60,
        ..Default::default()
    }));
    limiter.check_limit("a", 10, Duration::from_secs(1)).await;
    limiter.check_limit("b", 10, Duration::from_secs(1)).await;

    let handle = limiter.start_cleanup_task();
    tokio::time::sleep(Duration::from_secs(61)).await;

    // The task already swept both buckets
    assert_eq!(limiter.cleanup().await, 0);
    handle.abort();
}
