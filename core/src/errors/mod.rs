//! Domain-specific error types and error handling.

mod types;

#[cfg(test)]
mod tests;

// Re-export all error types
pub use types::{ErrorKind, OtpError, ProviderError};

use thiserror::Error;

/// Core domain errors (general purpose)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Rate limit exceeded: limit {limit}, retry after {retry_after_seconds}s")]
    RateLimited { limit: u32, retry_after_seconds: u64 },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    // Bridge to specific error types
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Otp(#[from] OtpError),
}

impl DomainError {
    /// Caller-facing classification
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Validation { .. } => ErrorKind::Validation,
            DomainError::RateLimited { .. } => ErrorKind::RateLimited,
            DomainError::Storage { .. } => ErrorKind::Storage,
            DomainError::Internal { .. } => ErrorKind::Internal,
            DomainError::Provider(e) => e.kind(),
            DomainError::Otp(e) => e.kind(),
        }
    }

    /// Expected user mistakes that callers should render as normal responses
    pub fn is_soft(&self) -> bool {
        matches!(self, DomainError::Otp(OtpError::OtpInvalid { .. }))
    }

    pub fn storage(message: impl Into<String>) -> Self {
        DomainError::Storage {
            message: message.into(),
        }
    }
}

pub type DomainResult<T> = Result<T, DomainError>;
