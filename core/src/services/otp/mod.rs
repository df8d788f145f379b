//! OTP verification engine
//!
//! Issues short-lived codes, delivers them through the provider manager and
//! verifies submissions against a SHA-256 hash with a bounded
//! attempt budget. Attempt updates are compare-and-set so concurrent verifies
//! of one record never both succeed.

pub mod code;
mod config;
mod service;
mod traits;
mod types;

#[cfg(test)]
mod tests;

pub use code::{code_matches, generate_code, hash_code};
pub use config::OtpServiceConfig;
pub use service::{OtpService, EXPIRY_MINUTES_VAR};
pub use traits::MessageRenderer;
pub use types::{OtpTarget, SendOtpRequest, SendOtpResponse, VerifyOtpRequest, VerifyOtpResult};
