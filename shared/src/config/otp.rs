//! OTP policy configuration

use serde::{Deserialize, Serialize};

/// Longest accepted resend cooldown (one day)
pub const MAX_RESEND_COOLDOWN_SECONDS: u64 = 86_400;

/// One-time passcode issuance and verification policy
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OtpConfig {
    /// Number of characters in a generated code
    #[serde(default = "default_length")]
    pub length: usize,

    /// Minutes until an issued code expires
    #[serde(default = "default_expiry_minutes")]
    pub expiry_minutes: u32,

    /// Verification attempts allowed per code
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Minimum seconds between two sends to the same phone and purpose
    #[serde(default = "default_resend_cooldown")]
    pub resend_cooldown_seconds: u64,

    /// Use letters as well as digits
    #[serde(default)]
    pub alphanumeric: bool,

    /// Distinguish upper and lower case (alphanumeric codes only)
    #[serde(default)]
    pub case_sensitive: bool,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            length: default_length(),
            expiry_minutes: default_expiry_minutes(),
            max_attempts: default_max_attempts(),
            resend_cooldown_seconds: default_resend_cooldown(),
            alphanumeric: false,
            case_sensitive: false,
        }
    }
}

fn default_length() -> usize {
    6
}

fn default_expiry_minutes() -> u32 {
    5
}

fn default_max_attempts() -> u32 {
    3
}

fn default_resend_cooldown() -> u64 {
    60
}
