//! OTP issuance and verification

use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use sg_shared::config::MAX_RESEND_COOLDOWN_SECONDS;
use sg_shared::utils::phone::{mask_phone_number, to_e164};

use crate::domain::entities::{OtpPurpose, OtpRecord, OtpState, OtpStatus};
use crate::domain::value_objects::{MessageType, SendRequest};
use crate::errors::{DomainError, DomainResult, OtpError, ProviderError};
use crate::repositories::OtpRepository;
use crate::services::providers::ProviderManager;
use crate::services::rate_limit::RateLimiter;

use super::code::{code_matches, generate_code, hash_code};
use super::config::OtpServiceConfig;
use super::traits::MessageRenderer;
use super::types::{OtpTarget, SendOtpRequest, SendOtpResponse, VerifyOtpRequest, VerifyOtpResult};

/// Variable name under which templates receive the expiry
pub const EXPIRY_MINUTES_VAR: &str = "expiry_minutes";

/// OTP service issuing, delivering and verifying one-time codes
pub struct OtpService {
    /// Record persistence
    repository: Arc<dyn OtpRepository>,
    /// Message text rendering
    renderer: Arc<dyn MessageRenderer>,
    /// Carrier routing
    providers: Arc<ProviderManager>,
    /// Issuance quotas
    rate_limiter: Arc<RateLimiter>,
    /// Service configuration
    config: OtpServiceConfig,
}

impl OtpService {
    /// Create a new OTP service
    pub fn new(
        repository: Arc<dyn OtpRepository>,
        renderer: Arc<dyn MessageRenderer>,
        providers: Arc<ProviderManager>,
        rate_limiter: Arc<RateLimiter>,
        config: OtpServiceConfig,
    ) -> Self {
        Self {
            repository,
            renderer,
            providers,
            rate_limiter,
            config,
        }
    }

    pub fn config(&self) -> &OtpServiceConfig {
        &self.config
    }

    /// Issue a new code and deliver it by SMS
    ///
    /// This method:
    /// 1. Normalises the phone number to E.164
    /// 2. Enforces the resend cooldown against the latest record
    /// 3. Claims the send slot for phone and purpose
    /// 4. Applies the layered OTP rate limits
    /// 5. Generates and hashes the code, renders and dispatches the message
    /// 6. Persists the record once the carrier accepted the message
    ///
    /// A cooldown rejection does not consume rate limit quota. The record is
    /// only written after a successful dispatch; when anything after step 3
    /// fails the slot is given back.
    pub async fn send(&self, request: SendOtpRequest) -> DomainResult<SendOtpResponse> {
        let phone = to_e164(&request.phone_number).ok_or_else(|| {
            DomainError::from(ProviderError::InvalidPhoneNumber {
                phone: mask_phone_number(&request.phone_number),
            })
        })?;
        let masked = mask_phone_number(&phone);
        let purpose = request.purpose;

        // Resend cooldown
        if let Some(latest) = self.repository.find_latest(&phone, purpose).await? {
            let cooldown_end = latest.created_at + self.cooldown();
            let now = Utc::now();
            if now < cooldown_end {
                let retry_after_seconds = (cooldown_end - now).num_seconds().max(1) as u64;
                return Err(self.cooldown_rejection(&masked, purpose, retry_after_seconds));
            }
        }

        let slot = self.claim_send_slot(&phone, &masked, purpose).await?;

        let result = self.issue(phone.clone(), &masked, request).await;
        if let (Err(_), Some(token)) = (&result, slot) {
            if let Err(e) = self.repository.release_send(&phone, purpose, token).await {
                tracing::warn!(phone = %masked, error = %e, "Failed to release OTP send slot");
            }
        }
        result
    }

    /// Reserve the send slot for the cooldown period
    ///
    /// Returns the holder token, or `None` when there is no cooldown.
    async fn claim_send_slot(
        &self,
        phone: &str,
        masked: &str,
        purpose: OtpPurpose,
    ) -> DomainResult<Option<Uuid>> {
        let cooldown_seconds = self.cooldown().num_seconds();
        if cooldown_seconds <= 0 {
            return Ok(None);
        }

        let token = Uuid::new_v4();
        let claimed = self
            .repository
            .reserve_send(phone, purpose, token, std::time::Duration::from_secs(cooldown_seconds as u64))
            .await?;
        if !claimed {
            return Err(self.cooldown_rejection(masked, purpose, cooldown_seconds as u64));
        }
        Ok(Some(token))
    }

    fn cooldown_rejection(&self, masked: &str, purpose: OtpPurpose, retry_after_seconds: u64) -> DomainError {
        tracing::warn!(
            phone = %masked,
            purpose = %purpose,
            retry_after_seconds,
            event = "otp_resend_cooldown",
            "OTP requested during resend cooldown"
        );
        OtpError::ResendCooldown { retry_after_seconds }.into()
    }

    /// Resend cooldown, bounded to what the configuration accepts
    fn cooldown(&self) -> Duration {
        Duration::seconds(
            self.config
                .resend_cooldown_seconds
                .clamp(0, MAX_RESEND_COOLDOWN_SECONDS as i64),
        )
    }

    /// Rate limit, generate, dispatch and persist
    async fn issue(&self, phone: String, masked: &str, request: SendOtpRequest) -> DomainResult<SendOtpResponse> {
        // Layered rate limits
        let limit = self
            .rate_limiter
            .check_otp(request.user_id.as_deref(), &phone)
            .await;
        if !limit.allowed {
            return Err(DomainError::RateLimited {
                limit: limit.limit,
                retry_after_seconds: limit.retry_after_seconds(),
            });
        }

        let code = generate_code(self.config.length, self.config.alphanumeric, self.config.case_sensitive);
        let code_hash = hash_code(&code, self.config.case_sensitive);

        let mut variables = request.variables.clone();
        variables
            .entry(EXPIRY_MINUTES_VAR.to_string())
            .or_insert_with(|| self.config.expiry_minutes.to_string());

        let message = self
            .renderer
            .render(request.template.as_deref(), request.purpose, &code, &variables)
            .await?;

        let sms = SendRequest::new(phone.clone(), message).with_type(MessageType::Otp);
        let delivery = self.providers.send(&sms).await.map_err(|e| {
            tracing::error!(
                phone = %masked,
                purpose = %request.purpose,
                error = %e,
                event = "otp_delivery_failed",
                "Failed to deliver OTP"
            );
            DomainError::from(e)
        })?;

        let mut record = OtpRecord::new(
            phone,
            code_hash,
            request.purpose,
            self.config.max_attempts,
            self.config.expiry_minutes,
            Utc::now(),
        );
        record.user_id = request.user_id;
        record.message_id = Some(delivery.message_id.clone());
        record.provider = Some(delivery.provider.clone());
        record.request_context = request.context;

        let record = self.repository.create(record).await.map_err(|e| {
            tracing::error!(
                phone = %masked,
                message_id = %delivery.message_id,
                error = %e,
                event = "otp_storage_failed",
                "OTP delivered but could not be stored"
            );
            e
        })?;

        tracing::info!(
            phone = %masked,
            purpose = %record.purpose,
            request_id = %record.id,
            provider = %delivery.provider,
            event = "otp_sent",
            "OTP issued"
        );

        Ok(SendOtpResponse {
            request_id: record.id,
            expires_at: record.expires_at,
            resend_after: record.created_at + self.cooldown(),
            attempts_left: record.remaining_attempts(),
            provider: delivery.provider,
            message_id: delivery.message_id,
        })
    }

    /// Verify a submitted code
    ///
    /// Checks run in this order: existence, expiry, attempt budget, already
    /// verified. Only then is the code compared. A wrong code with attempts
    /// left is returned as `Ok` with `valid == false`; the attempt that uses up
    /// the budget fails with `OtpMaxAttempts`.
    pub async fn verify(&self, request: VerifyOtpRequest) -> DomainResult<VerifyOtpResult> {
        for _ in 0..=self.config.max_conflict_retries {
            let record = self.resolve(&request.target).await?;
            let now = Utc::now();

            if record.is_expired(now) {
                return Err(OtpError::OtpExpired.into());
            }
            if record.attempts_exhausted() {
                return Err(OtpError::OtpMaxAttempts.into());
            }
            if record.verified {
                return Err(OtpError::OtpAlreadyUsed.into());
            }

            let matched = code_matches(&record.code_hash, &request.code, self.config.case_sensitive);

            if matched {
                if !self.repository.mark_verified(record.id, record.attempts, now).await? {
                    tracing::debug!(request_id = %record.id, "Concurrent update while verifying, retrying");
                    continue;
                }

                tracing::info!(
                    request_id = %record.id,
                    purpose = %record.purpose,
                    event = "otp_verified",
                    "OTP verified successfully"
                );
                let remaining = record.remaining_attempts();
                return Ok(VerifyOtpResult::verified(record.id, record.user_id, remaining));
            }

            if !self.repository.increment_attempts(record.id, record.attempts).await? {
                tracing::debug!(request_id = %record.id, "Concurrent update while verifying, retrying");
                continue;
            }

            let attempts = record.attempts + 1;
            let remaining = record.max_attempts.saturating_sub(attempts);
            tracing::info!(
                request_id = %record.id,
                attempts,
                remaining,
                event = "otp_verification_failed",
                "Invalid OTP submitted"
            );

            if remaining == 0 {
                return Err(OtpError::OtpMaxAttempts.into());
            }
            return Ok(VerifyOtpResult::invalid(record.id, record.user_id, remaining));
        }

        Err(DomainError::storage("OTP record kept changing during verification"))
    }

    /// Cancel a pending code; cancelling a finished one is a no-op
    pub async fn cancel(&self, request_id: Uuid) -> DomainResult<()> {
        let record = self
            .repository
            .find_by_id(request_id)
            .await?
            .ok_or(OtpError::OtpNotFound)?;

        let state = record.state_at(Utc::now());
        if state.is_terminal() {
            tracing::debug!(request_id = %request_id, state = ?state, "OTP already finished, cancel ignored");
            return Ok(());
        }

        if self.repository.mark_cancelled(request_id).await? {
            tracing::info!(request_id = %request_id, event = "otp_cancelled", "OTP cancelled");
        }
        Ok(())
    }

    /// Non-sensitive metadata for a record
    pub async fn get_status(&self, request_id: Uuid) -> DomainResult<OtpStatus> {
        let record = self
            .repository
            .find_by_id(request_id)
            .await?
            .ok_or(OtpError::OtpNotFound)?;
        Ok(record.status_at(Utc::now()))
    }

    /// Find the record a verify request refers to
    ///
    /// Cancelled records are treated as missing. A phone lookup prefers the
    /// active record and otherwise reports on the latest one, so that a reused
    /// or expired code gets a specific answer.
    async fn resolve(&self, target: &OtpTarget) -> DomainResult<OtpRecord> {
        let record = match target {
            OtpTarget::RequestId(id) => self.repository.find_by_id(*id).await?,
            OtpTarget::Phone {
                phone_number,
                purpose,
            } => {
                let phone = to_e164(phone_number).ok_or(OtpError::OtpNotFound)?;
                match self.repository.find_active(&phone, *purpose, Utc::now()).await? {
                    Some(record) => Some(record),
                    None => self.repository.find_latest(&phone, *purpose).await?,
                }
            }
        };

        match record {
            Some(record) if record.state_at(Utc::now()) != OtpState::Cancelled => Ok(record),
            _ => Err(OtpError::OtpNotFound.into()),
        }
    }
}
