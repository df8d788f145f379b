//! In-process OTP repository for development and tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::entities::{OtpPurpose, OtpRecord};
use crate::errors::DomainError;

use super::r#trait::OtpRepository;

/// OTP repository backed by a map behind a single lock
pub struct InMemoryOtpRepository {
    records: RwLock<HashMap<Uuid, OtpRecord>>,
    /// Send slots: holder token and claim expiry per phone and purpose
    send_slots: RwLock<HashMap<(String, OtpPurpose), (Uuid, DateTime<Utc>)>>,
}

impl InMemoryOtpRepository {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            send_slots: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Most recent matching record, ties broken by id for determinism
    async fn latest_matching<F>(&self, phone_number: &str, purpose: OtpPurpose, filter: F) -> Option<OtpRecord>
    where
        F: Fn(&OtpRecord) -> bool,
    {
        let records = self.records.read().await;
        records
            .values()
            .filter(|r| r.phone_number == phone_number && r.purpose == purpose)
            .filter(|r| filter(r))
            .max_by_key(|r| (r.created_at, r.id))
            .cloned()
    }
}

impl Default for InMemoryOtpRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OtpRepository for InMemoryOtpRepository {
    async fn create(&self, record: OtpRecord) -> Result<OtpRecord, DomainError> {
        let mut records = self.records.write().await;

        if records.contains_key(&record.id) {
            return Err(DomainError::Validation {
                message: format!("OTP record {} already exists", record.id),
            });
        }

        records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<OtpRecord>, DomainError> {
        let records = self.records.read().await;
        Ok(records.get(&id).cloned())
    }

    async fn find_active(
        &self,
        phone_number: &str,
        purpose: OtpPurpose,
        now: DateTime<Utc>,
    ) -> Result<Option<OtpRecord>, DomainError> {
        Ok(self
            .latest_matching(phone_number, purpose, |r| r.is_active(now))
            .await)
    }

    async fn find_latest(
        &self,
        phone_number: &str,
        purpose: OtpPurpose,
    ) -> Result<Option<OtpRecord>, DomainError> {
        Ok(self.latest_matching(phone_number, purpose, |_| true).await)
    }

    async fn increment_attempts(
        &self,
        id: Uuid,
        expected_attempts: u32,
    ) -> Result<bool, DomainError> {
        let mut records = self.records.write().await;
        match records.get_mut(&id) {
            Some(record)
                if !record.verified
                    && !record.cancelled
                    && record.attempts == expected_attempts =>
            {
                record.attempts += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_verified(
        &self,
        id: Uuid,
        expected_attempts: u32,
        verified_at: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        let mut records = self.records.write().await;
        match records.get_mut(&id) {
            Some(record)
                if !record.verified
                    && !record.cancelled
                    && record.attempts == expected_attempts =>
            {
                record.verified = true;
                record.verified_at = Some(verified_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_cancelled(&self, id: Uuid) -> Result<bool, DomainError> {
        let mut records = self.records.write().await;
        match records.get_mut(&id) {
            Some(record) if !record.verified && !record.cancelled => {
                record.cancelled = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn reserve_send(
        &self,
        phone_number: &str,
        purpose: OtpPurpose,
        token: Uuid,
        cooldown: Duration,
    ) -> Result<bool, DomainError> {
        let now = Utc::now();
        let until = chrono::Duration::from_std(cooldown)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let mut slots = self.send_slots.write().await;
        // Drop lapsed claims on the way
        slots.retain(|_, (_, expires_at)| *expires_at > now);

        let key = (phone_number.to_string(), purpose);
        if slots.contains_key(&key) {
            return Ok(false);
        }
        slots.insert(key, (token, until));
        Ok(true)
    }

    async fn release_send(
        &self,
        phone_number: &str,
        purpose: OtpPurpose,
        token: Uuid,
    ) -> Result<(), DomainError> {
        let mut slots = self.send_slots.write().await;
        let key = (phone_number.to_string(), purpose);
        if matches!(slots.get(&key), Some((holder, _)) if *holder == token) {
            slots.remove(&key);
        }
        Ok(())
    }
}
