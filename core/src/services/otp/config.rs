//! Configuration for the OTP service

use sg_shared::config::{OtpConfig, MAX_RESEND_COOLDOWN_SECONDS};

use crate::domain::entities::{DEFAULT_CODE_LENGTH, DEFAULT_EXPIRY_MINUTES, DEFAULT_MAX_ATTEMPTS};

/// Configuration for the OTP service
#[derive(Debug, Clone)]
pub struct OtpServiceConfig {
    /// Number of characters in a generated code
    pub length: usize,
    /// Number of minutes before a code expires
    pub expiry_minutes: i64,
    /// Maximum number of verification attempts allowed
    pub max_attempts: u32,
    /// Minimum seconds between sends to the same phone and purpose
    pub resend_cooldown_seconds: i64,
    /// Use letters as well as digits
    pub alphanumeric: bool,
    /// Distinguish letter case when verifying
    pub case_sensitive: bool,
    /// How often a verify is re-evaluated after losing a concurrent update
    pub max_conflict_retries: u32,
}

impl Default for OtpServiceConfig {
    fn default() -> Self {
        Self {
            length: DEFAULT_CODE_LENGTH,
            expiry_minutes: DEFAULT_EXPIRY_MINUTES,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            resend_cooldown_seconds: 60,
            alphanumeric: false,
            case_sensitive: false,
            max_conflict_retries: 3,
        }
    }
}

impl From<&OtpConfig> for OtpServiceConfig {
    fn from(config: &OtpConfig) -> Self {
        Self {
            length: config.length,
            expiry_minutes: i64::from(config.expiry_minutes),
            max_attempts: config.max_attempts,
            resend_cooldown_seconds: config.resend_cooldown_seconds.min(MAX_RESEND_COOLDOWN_SECONDS) as i64,
            alphanumeric: config.alphanumeric,
            // Numeric codes have no case
            case_sensitive: config.alphanumeric && config.case_sensitive,
            ..Default::default()
        }
    }
}
