//! Specialised error types for carrier delivery and OTP handling
//!
//! Messages are kept in English; caller-facing wording is mapped from
//! [`ErrorKind::code`] in the presentation layer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Carrier and failover errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("No SMS providers available")]
    NoProvidersAvailable,

    #[error("Provider not found: {name}")]
    ProviderNotFound { name: String },

    #[error("Invalid phone number: {phone}")]
    InvalidPhoneNumber { phone: String },

    #[error("Message too long: {length} characters (max {max})")]
    MessageTooLong { length: usize, max: usize },

    #[error("Delivery failed via {provider}: {reason}")]
    DeliveryFailed { provider: String, reason: String },

    #[error("Insufficient balance on {provider}")]
    InsufficientBalance { provider: String },

    #[error("Provider {provider} timed out after {seconds}s")]
    Timeout { provider: String, seconds: u64 },

    #[error("Invalid webhook payload: {reason}")]
    InvalidWebhook { reason: String },
}

/// OTP lifecycle errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OtpError {
    #[error("Please wait {retry_after_seconds}s before requesting a new code")]
    ResendCooldown { retry_after_seconds: u64 },

    #[error("OTP not found")]
    OtpNotFound,

    #[error("OTP expired")]
    OtpExpired,

    #[error("Maximum verification attempts exceeded")]
    OtpMaxAttempts,

    #[error("Invalid OTP, {remaining_attempts} attempts remaining")]
    OtpInvalid { remaining_attempts: u32 },

    #[error("OTP already used")]
    OtpAlreadyUsed,
}

/// Closed set of error kinds exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NoProvidersAvailable,
    ProviderNotFound,
    InvalidPhoneNumber,
    MessageTooLong,
    DeliveryFailed,
    RateLimited,
    InsufficientBalance,
    ResendCooldown,
    OtpNotFound,
    OtpExpired,
    OtpMaxAttempts,
    OtpInvalid,
    OtpAlreadyUsed,
    Validation,
    Storage,
    Internal,
}

impl ErrorKind {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::NoProvidersAvailable => "no_providers_available",
            ErrorKind::ProviderNotFound => "provider_not_found",
            ErrorKind::InvalidPhoneNumber => "invalid_phone_number",
            ErrorKind::MessageTooLong => "message_too_long",
            ErrorKind::DeliveryFailed => "delivery_failed",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::InsufficientBalance => "insufficient_balance",
            ErrorKind::ResendCooldown => "resend_cooldown",
            ErrorKind::OtpNotFound => "otp_not_found",
            ErrorKind::OtpExpired => "otp_expired",
            ErrorKind::OtpMaxAttempts => "otp_max_attempts",
            ErrorKind::OtpInvalid => "otp_invalid",
            ErrorKind::OtpAlreadyUsed => "otp_already_used",
            ErrorKind::Validation => "validation",
            ErrorKind::Storage => "storage",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::NoProvidersAvailable => ErrorKind::NoProvidersAvailable,
            ProviderError::ProviderNotFound { .. } => ErrorKind::ProviderNotFound,
            ProviderError::InvalidPhoneNumber { .. } => ErrorKind::InvalidPhoneNumber,
            ProviderError::MessageTooLong { .. } => ErrorKind::MessageTooLong,
            ProviderError::DeliveryFailed { .. } | ProviderError::Timeout { .. } => {
                ErrorKind::DeliveryFailed
            }
            ProviderError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            ProviderError::InvalidWebhook { .. } => ErrorKind::Validation,
        }
    }
}

impl OtpError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OtpError::ResendCooldown { .. } => ErrorKind::ResendCooldown,
            OtpError::OtpNotFound => ErrorKind::OtpNotFound,
            OtpError::OtpExpired => ErrorKind::OtpExpired,
            OtpError::OtpMaxAttempts => ErrorKind::OtpMaxAttempts,
            OtpError::OtpInvalid { .. } => ErrorKind::OtpInvalid,
            OtpError::OtpAlreadyUsed => ErrorKind::OtpAlreadyUsed,
        }
    }
}
