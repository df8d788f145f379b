//! OTP repository trait defining the interface for OTP record persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

use crate::domain::entities::{OtpPurpose, OtpRecord};
use crate::errors::DomainError;

/// Repository trait for OtpRecord persistence operations
///
/// Records are never deleted through this trait. Every mutation is atomic per
/// record, and the verification mutations are compare-and-set on `attempts`
/// so that concurrent verifies of one record cannot overrun its budget.
#[async_trait]
pub trait OtpRepository: Send + Sync {
    /// Persist a new record
    ///
    /// # Returns
    /// * `Ok(OtpRecord)` - The stored record
    /// * `Err(DomainError)` - Storage failed or the id already exists
    async fn create(&self, record: OtpRecord) -> Result<OtpRecord, DomainError>;

    /// Find a record by id
    async fn find_by_id(&self, id: Uuid) -> Result<Option<OtpRecord>, DomainError>;

    /// Most recent record for phone and purpose that is neither verified,
    /// cancelled nor expired at `now`
    async fn find_active(
        &self,
        phone_number: &str,
        purpose: OtpPurpose,
        now: DateTime<Utc>,
    ) -> Result<Option<OtpRecord>, DomainError>;

    /// Most recent record for phone and purpose regardless of state
    async fn find_latest(
        &self,
        phone_number: &str,
        purpose: OtpPurpose,
    ) -> Result<Option<OtpRecord>, DomainError>;

    /// Increment `attempts` by one
    ///
    /// Applies only if the record exists, is neither verified nor cancelled,
    /// and `attempts` still equals `expected_attempts`.
    ///
    /// # Returns
    /// * `Ok(true)` - The increment was applied
    /// * `Ok(false)` - The record changed concurrently (or is gone); reload and re-evaluate
    async fn increment_attempts(
        &self,
        id: Uuid,
        expected_attempts: u32,
    ) -> Result<bool, DomainError>;

    /// Set `verified` and `verified_at`, under the same conditions as
    /// [`increment_attempts`](Self::increment_attempts)
    async fn mark_verified(
        &self,
        id: Uuid,
        expected_attempts: u32,
        verified_at: DateTime<Utc>,
    ) -> Result<bool, DomainError>;

    /// Set `cancelled` unless the record is verified or already cancelled
    ///
    /// # Returns
    /// * `Ok(true)` - The record was cancelled by this call
    /// * `Ok(false)` - Nothing changed
    async fn mark_cancelled(&self, id: Uuid) -> Result<bool, DomainError>;

    /// Claim the send slot for phone and purpose for `cooldown`
    ///
    /// At most one unexpired claim exists per phone and purpose, so concurrent
    /// sends cannot both get past the resend cooldown.
    ///
    /// # Returns
    /// * `Ok(true)` - `token` now holds the slot
    /// * `Ok(false)` - Another send holds it
    async fn reserve_send(
        &self,
        phone_number: &str,
        purpose: OtpPurpose,
        token: Uuid,
        cooldown: Duration,
    ) -> Result<bool, DomainError>;

    /// Free a slot claimed with `token`; a slot held by another token is left alone
    async fn release_send(
        &self,
        phone_number: &str,
        purpose: OtpPurpose,
        token: Uuid,
    ) -> Result<(), DomainError>;
}
