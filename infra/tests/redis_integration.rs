//! Integration tests for the Redis-backed stores
//!
//! These tests require a running Redis instance to execute.
//! Run with: cargo test -p sg_infra --test redis_integration -- --ignored

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use sg_core::domain::entities::{OtpPurpose, OtpRecord};
use sg_core::repositories::OtpRepository;
use sg_core::services::rate_limit::{CounterStore, RateLimiter};
use sg_infra::cache::{CacheConfig, RedisClient, RedisCounterStore, RedisOtpRepository};
use sg_shared::config::RateLimitConfig;

async fn client() -> RedisClient {
    let config = CacheConfig::new(
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
    )
    .with_prefix(format!("sg_it_{}", Uuid::new_v4().simple()));

    RedisClient::new(config)
        .await
        .expect("Failed to connect to Redis")
}

fn unique_phone() -> String {
    let n = Uuid::new_v4().as_u128() % 10_000_000;
    format!("+1555{:07}", n)
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn test_counter_window() {
    let store = RedisCounterStore::new(client().await);
    let key = "otp:phone:+15550000000:minute";

    let first = store
        .increment_with_expiry(key, Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(first.count, 1);
    assert!(first.ttl <= Duration::from_secs(2));

    let second = store
        .increment_with_expiry(key, Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(second.count, 2);
    assert_eq!(store.get_count(key).await.unwrap(), 2);

    // The window is fixed from the first hit
    tokio::time::sleep(Duration::from_millis(2100)).await;
    assert_eq!(store.get_count(key).await.unwrap(), 0);

    store
        .increment_with_expiry(key, Duration::from_secs(60))
        .await
        .unwrap();
    store.delete(key).await.unwrap();
    assert_eq!(store.get_count(key).await.unwrap(), 0);
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn test_limiter_counts_in_redis() {
    let config = RateLimitConfig {
        otp_per_minute: 2,
        ..RateLimitConfig::default()
    };
    let store: Arc<dyn CounterStore> = Arc::new(RedisCounterStore::new(client().await));
    let limiter = RateLimiter::new(config, Some(store));
    let phone = unique_phone();

    assert!(limiter.check_otp(None, &phone).await.allowed);
    assert!(limiter.check_otp(None, &phone).await.allowed);

    let third = limiter.check_otp(None, &phone).await;
    assert!(!third.allowed);
    assert_eq!(third.limit, 2);
    assert!(third.retry_after_seconds() >= 1);
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn test_otp_repository_round_trip() {
    let repo = RedisOtpRepository::new(client().await);
    let phone = unique_phone();

    let older = OtpRecord::new(
        phone.clone(),
        "hash-1".to_string(),
        OtpPurpose::Login,
        3,
        5,
        Utc::now() - chrono::Duration::seconds(30),
    );
    let mut newer = OtpRecord::new(
        phone.clone(),
        "hash-2".to_string(),
        OtpPurpose::Login,
        3,
        5,
        Utc::now(),
    );
    newer.user_id = Some("user-7".to_string());

    repo.create(older.clone()).await.unwrap();
    repo.create(newer.clone()).await.unwrap();
    assert!(repo.create(newer.clone()).await.is_err());

    let found = repo.find_by_id(newer.id).await.unwrap().unwrap();
    assert_eq!(found.user_id.as_deref(), Some("user-7"));
    assert_eq!(found.created_at, newer.created_at);

    let latest = repo.find_latest(&phone, OtpPurpose::Login).await.unwrap();
    assert_eq!(latest.map(|r| r.id), Some(newer.id));

    // Cancelling the newest exposes the older one as active
    assert!(repo.mark_cancelled(newer.id).await.unwrap());
    assert!(!repo.mark_cancelled(newer.id).await.unwrap());
    let active = repo
        .find_active(&phone, OtpPurpose::Login, Utc::now())
        .await
        .unwrap();
    assert_eq!(active.map(|r| r.id), Some(older.id));

    assert!(repo
        .find_latest(&phone, OtpPurpose::Registration)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn test_otp_repository_compare_and_set() {
    let repo = RedisOtpRepository::new(client().await);
    let record = OtpRecord::new(
        unique_phone(),
        "hash".to_string(),
        OtpPurpose::Verification,
        3,
        5,
        Utc::now(),
    );
    repo.create(record.clone()).await.unwrap();

    assert!(repo.increment_attempts(record.id, 0).await.unwrap());
    // Stale expectation is refused
    assert!(!repo.increment_attempts(record.id, 0).await.unwrap());
    assert!(repo.mark_verified(record.id, 1, Utc::now()).await.unwrap());
    assert!(!repo.increment_attempts(record.id, 1).await.unwrap());
    assert!(!repo.mark_cancelled(record.id).await.unwrap());

    let stored = repo.find_by_id(record.id).await.unwrap().unwrap();
    assert_eq!(stored.attempts, 1);
    assert!(stored.verified);
    assert!(stored.verified_at.is_some());

    assert!(!repo.increment_attempts(Uuid::new_v4(), 0).await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore] // Requires Redis server
async fn test_concurrent_increments_apply_once() {
    let repo = Arc::new(RedisOtpRepository::new(client().await));
    let record = OtpRecord::new(
        unique_phone(),
        "hash".to_string(),
        OtpPurpose::Login,
        3,
        5,
        Utc::now(),
    );
    repo.create(record.clone()).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let repo = repo.clone();
        handles.push(tokio::spawn(async move {
            repo.increment_attempts(record.id, 0).await.unwrap()
        }));
    }

    let mut applied = 0;
    for handle in handles {
        if handle.await.unwrap() {
            applied += 1;
        }
    }
    assert_eq!(applied, 1);
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn test_send_slot_claims() {
    let repo = RedisOtpRepository::new(client().await);
    let phone = unique_phone();
    let (first, second) = (Uuid::new_v4(), Uuid::new_v4());
    let cooldown = Duration::from_secs(60);

    assert!(repo.reserve_send(&phone, OtpPurpose::Login, first, cooldown).await.unwrap());
    assert!(!repo.reserve_send(&phone, OtpPurpose::Login, second, cooldown).await.unwrap());

    // A foreign token does not free the slot
    repo.release_send(&phone, OtpPurpose::Login, second).await.unwrap();
    assert!(!repo.reserve_send(&phone, OtpPurpose::Login, second, cooldown).await.unwrap());

    repo.release_send(&phone, OtpPurpose::Login, first).await.unwrap();
    assert!(repo.reserve_send(&phone, OtpPurpose::Login, second, cooldown).await.unwrap());

    // Claims lapse with the cooldown
    let short = Duration::from_millis(200);
    assert!(repo.reserve_send(&phone, OtpPurpose::Registration, first, short).await.unwrap());
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(repo.reserve_send(&phone, OtpPurpose::Registration, second, short).await.unwrap());
}
