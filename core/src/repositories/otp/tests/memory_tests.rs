//! Unit tests for the in-memory OTP repository

use chrono::{Duration, Utc};
use std::sync::Arc;

use crate::domain::entities::{OtpPurpose, OtpRecord};
use crate::repositories::otp::{InMemoryOtpRepository, OtpRepository};

const PHONE: &str = "+15551234567";

fn record_at(offset_secs: i64) -> OtpRecord {
    OtpRecord::new(
        PHONE.to_string(),
        "hash".to_string(),
        OtpPurpose::Login,
        3,
        5,
        Utc::now() + Duration::seconds(offset_secs),
    )
}

#[tokio::test]
async fn test_create_and_find_by_id() {
    let repo = InMemoryOtpRepository::new();
    let record = record_at(0);

    let saved = repo.create(record.clone()).await.unwrap();
    assert_eq!(saved, record);
    assert_eq!(repo.find_by_id(record.id).await.unwrap(), Some(record.clone()));

    // Duplicate ids are rejected
    assert!(repo.create(record).await.is_err());
    assert_eq!(repo.len().await, 1);
}

#[tokio::test]
async fn test_find_active_skips_terminal_records() {
    let repo = InMemoryOtpRepository::new();
    let older = repo.create(record_at(-30)).await.unwrap();
    let newer = repo.create(record_at(-10)).await.unwrap();
    let now = Utc::now();

    let active = repo.find_active(PHONE, OtpPurpose::Login, now).await.unwrap();
    assert_eq!(active.map(|r| r.id), Some(newer.id));

    repo.mark_cancelled(newer.id).await.unwrap();
    let active = repo.find_active(PHONE, OtpPurpose::Login, now).await.unwrap();
    assert_eq!(active.map(|r| r.id), Some(older.id));

    // Latest ignores state
    let latest = repo.find_latest(PHONE, OtpPurpose::Login).await.unwrap();
    assert_eq!(latest.map(|r| r.id), Some(newer.id));

    // Different purpose is a different bucket
    assert!(repo
        .find_latest(PHONE, OtpPurpose::Registration)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_find_active_ignores_expired() {
    let repo = InMemoryOtpRepository::new();
    let record = repo.create(record_at(0)).await.unwrap();

    let later = record.expires_at + Duration::seconds(1);
    assert!(repo
        .find_active(PHONE, OtpPurpose::Login, later)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_increment_attempts_is_compare_and_set() {
    let repo = InMemoryOtpRepository::new();
    let record = repo.create(record_at(0)).await.unwrap();

    assert!(repo.increment_attempts(record.id, 0).await.unwrap());
    // Stale expectation
    assert!(!repo.increment_attempts(record.id, 0).await.unwrap());
    assert!(repo.increment_attempts(record.id, 1).await.unwrap());

    let stored = repo.find_by_id(record.id).await.unwrap().unwrap();
    assert_eq!(stored.attempts, 2);
}

#[tokio::test]
async fn test_mark_verified_requires_matching_attempts() {
    let repo = InMemoryOtpRepository::new();
    let record = repo.create(record_at(0)).await.unwrap();
    let now = Utc::now();

    repo.increment_attempts(record.id, 0).await.unwrap();
    assert!(!repo.mark_verified(record.id, 0, now).await.unwrap());
    assert!(repo.mark_verified(record.id, 1, now).await.unwrap());
    assert!(!repo.mark_verified(record.id, 1, now).await.unwrap());

    let stored = repo.find_by_id(record.id).await.unwrap().unwrap();
    assert!(stored.verified);
    assert_eq!(stored.verified_at, Some(now));

    // Verified records no longer accept attempts or cancellation
    assert!(!repo.increment_attempts(record.id, 1).await.unwrap());
    assert!(!repo.mark_cancelled(record.id).await.unwrap());
}

#[tokio::test]
async fn test_mark_cancelled_is_idempotent() {
    let repo = InMemoryOtpRepository::new();
    let record = repo.create(record_at(0)).await.unwrap();

    assert!(repo.mark_cancelled(record.id).await.unwrap());
    assert!(!repo.mark_cancelled(record.id).await.unwrap());
    assert!(!repo.mark_cancelled(uuid::Uuid::new_v4()).await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_increments_never_exceed_one_per_expectation() {
    let repo = Arc::new(InMemoryOtpRepository::new());
    let record = repo.create(record_at(0)).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..16 {
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
    assert_eq!(repo.find_by_id(record.id).await.unwrap().unwrap().attempts, 1);
}

#[tokio::test]
async fn test_send_slot_is_exclusive_until_released() {
    let repo = InMemoryOtpRepository::new();
    let (first, second) = (uuid::Uuid::new_v4(), uuid::Uuid::new_v4());
    let cooldown = std::time::Duration::from_secs(60);

    assert!(repo.reserve_send(PHONE, OtpPurpose::Login, first, cooldown).await.unwrap());
    assert!(!repo.reserve_send(PHONE, OtpPurpose::Login, second, cooldown).await.unwrap());
    // Slots are per purpose
    assert!(repo
        .reserve_send(PHONE, OtpPurpose::Registration, second, cooldown)
        .await
        .unwrap());

    // Only the holder can free its slot
    repo.release_send(PHONE, OtpPurpose::Login, second).await.unwrap();
    assert!(!repo.reserve_send(PHONE, OtpPurpose::Login, second, cooldown).await.unwrap());

    repo.release_send(PHONE, OtpPurpose::Login, first).await.unwrap();
    assert!(repo.reserve_send(PHONE, OtpPurpose::Login, second, cooldown).await.unwrap());
}

#[tokio::test]
async fn test_send_slot_lapses_after_cooldown() {
    let repo = InMemoryOtpRepository::new();
    let cooldown = std::time::Duration::from_millis(20);

    assert!(repo
        .reserve_send(PHONE, OtpPurpose::Login, uuid::Uuid::new_v4(), cooldown)
        .await
        .unwrap());
    tokio::time::sleep(std::time::Duration::from_millis(40)).await;
    assert!(repo
        .reserve_send(PHONE, OtpPurpose::Login, uuid::Uuid::new_v4(), cooldown)
        .await
        .unwrap());
}
