//! Rate limiting configuration module

use serde::{Deserialize, Serialize};

/// Rate limiting configuration
///
/// `default_*` limits apply to API keys, `otp_*` limits to OTP issuance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Max API requests per key per minute
    #[serde(default = "default_per_minute")]
    pub default_per_minute: u32,

    /// Max API requests per key per hour
    #[serde(default = "default_per_hour")]
    pub default_per_hour: u32,

    /// Max API requests per key per day
    #[serde(default = "default_per_day")]
    pub default_per_day: u32,

    /// Max OTP sends per user per minute
    #[serde(default = "default_otp_per_minute")]
    pub otp_per_minute: u32,

    /// Max OTP sends per user per hour
    #[serde(default = "default_otp_per_hour")]
    pub otp_per_hour: u32,

    /// Max OTP sends per phone number per day
    #[serde(default = "default_otp_per_phone_per_day")]
    pub otp_per_phone_per_day: u32,

    /// Interval between sweeps of expired in-process buckets, in seconds
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            default_per_minute: default_per_minute(),
            default_per_hour: default_per_hour(),
            default_per_day: default_per_day(),
            otp_per_minute: default_otp_per_minute(),
            otp_per_hour: default_otp_per_hour(),
            otp_per_phone_per_day: default_otp_per_phone_per_day(),
            cleanup_interval_seconds: default_cleanup_interval(),
        }
    }
}

impl RateLimitConfig {
    /// Configuration with rate limiting switched off
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Create a development configuration (more lenient limits)
    pub fn development() -> Self {
        Self {
            otp_per_minute: 10,
            otp_per_hour: 50,
            otp_per_phone_per_day: 50,
            ..Default::default()
        }
    }

    /// Create a production configuration (stricter limits)
    pub fn production() -> Self {
        Self::default()
    }
}

fn default_enabled() -> bool {
    true
}

fn default_per_minute() -> u32 {
    30
}

fn default_per_hour() -> u32 {
    500
}

fn default_per_day() -> u32 {
    5000
}

fn default_otp_per_minute() -> u32 {
    3
}

fn default_otp_per_hour() -> u32 {
    10
}

fn default_otp_per_phone_per_day() -> u32 {
    5
}

fn default_cleanup_interval() -> u64 {
    60 // 1 minute
}
