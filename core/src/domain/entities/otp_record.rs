//! OTP record entity and its lifecycle states.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default number of characters in a generated code
pub const DEFAULT_CODE_LENGTH: usize = 6;

/// Default expiration time for codes (5 minutes)
pub const DEFAULT_EXPIRY_MINUTES: i64 = 5;

/// Default number of verification attempts
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// What an OTP is being issued for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpPurpose {
    Login,
    Registration,
    PasswordReset,
    Verification,
    Transaction,
    #[serde(rename = "2fa")]
    TwoFactor,
}

impl OtpPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpPurpose::Login => "login",
            OtpPurpose::Registration => "registration",
            OtpPurpose::PasswordReset => "password_reset",
            OtpPurpose::Verification => "verification",
            OtpPurpose::Transaction => "transaction",
            OtpPurpose::TwoFactor => "2fa",
        }
    }
}

impl std::fmt::Display for OtpPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OtpPurpose {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "login" => Ok(OtpPurpose::Login),
            "registration" => Ok(OtpPurpose::Registration),
            "password_reset" => Ok(OtpPurpose::PasswordReset),
            "verification" => Ok(OtpPurpose::Verification),
            "transaction" => Ok(OtpPurpose::Transaction),
            "2fa" | "two_factor" => Ok(OtpPurpose::TwoFactor),
            _ => Err(format!("Invalid OTP purpose: {}", s)),
        }
    }
}

/// Caller metadata kept for audit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Lifecycle state of a record, evaluated lazily against a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpState {
    Pending,
    Verified,
    Cancelled,
    Expired,
    MaxAttemptsExceeded,
}

impl OtpState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OtpState::Pending)
    }
}

/// One issued code bound to a phone number and purpose
///
/// Only the SHA-256 hash of the code is kept. Records are never deleted by the
/// engine; a newer record for the same phone and purpose supersedes older ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpRecord {
    pub id: Uuid,

    /// Destination in E.164 format
    pub phone_number: String,

    /// Hex-encoded SHA-256 of the (case-normalised) code
    pub code_hash: String,

    pub purpose: OtpPurpose,

    pub user_id: Option<String>,

    /// Failed verification attempts so far, never above `max_attempts`
    pub attempts: u32,

    pub max_attempts: u32,

    pub verified: bool,

    pub cancelled: bool,

    pub expires_at: DateTime<Utc>,

    pub verified_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    /// Carrier message id of the SMS that delivered the code
    pub message_id: Option<String>,

    /// Carrier that delivered the code
    pub provider: Option<String>,

    #[serde(default)]
    pub request_context: RequestContext,
}

impl OtpRecord {
    /// Creates a pending record issued at `now`
    pub fn new(
        phone_number: String,
        code_hash: String,
        purpose: OtpPurpose,
        max_attempts: u32,
        expiry_minutes: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            phone_number,
            code_hash,
            purpose,
            user_id: None,
            attempts: 0,
            max_attempts,
            verified: false,
            cancelled: false,
            expires_at: now + Duration::minutes(expiry_minutes),
            verified_at: None,
            created_at: now,
            message_id: None,
            provider: None,
            request_context: RequestContext::default(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    pub fn remaining_attempts(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempts)
    }

    /// Candidate for verification: neither verified, cancelled nor expired
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.verified && !self.cancelled && !self.is_expired(now)
    }

    /// The single state this record is in at `now`
    pub fn state_at(&self, now: DateTime<Utc>) -> OtpState {
        if self.verified {
            OtpState::Verified
        } else if self.cancelled {
            OtpState::Cancelled
        } else if self.is_expired(now) {
            OtpState::Expired
        } else if self.attempts_exhausted() {
            OtpState::MaxAttemptsExceeded
        } else {
            OtpState::Pending
        }
    }

    /// Metadata safe to hand to callers
    pub fn status_at(&self, now: DateTime<Utc>) -> OtpStatus {
        OtpStatus {
            request_id: self.id,
            purpose: self.purpose,
            state: self.state_at(now),
            verified: self.verified,
            cancelled: self.cancelled,
            attempts: self.attempts,
            max_attempts: self.max_attempts,
            expires_at: self.expires_at,
            verified_at: self.verified_at,
            created_at: self.created_at,
        }
    }
}

/// Read-only view of a record; carries no code material
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpStatus {
    pub request_id: Uuid,
    pub purpose: OtpPurpose,
    pub state: OtpState,
    pub verified: bool,
    pub cancelled: bool,
    pub attempts: u32,
    pub max_attempts: u32,
    pub expires_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
