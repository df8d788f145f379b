//! Business services: carrier failover, rate limiting and OTP handling.

pub mod otp;
pub mod providers;
pub mod rate_limit;
pub mod templates;

// Re-export commonly used types
pub use otp::{
    MessageRenderer, OtpService, OtpServiceConfig, OtpTarget, SendOtpRequest, SendOtpResponse,
    VerifyOtpRequest, VerifyOtpResult,
};
pub use providers::{CarrierAdapter, ProviderManager, ProviderManagerConfig, ProviderStatus};
pub use rate_limit::{
    CounterSnapshot, CounterStore, RateLimitResult, RateLimiter, RateWindow, RateWindowKey,
};
pub use templates::{TemplateRenderer, DEFAULT_OTP_TEMPLATES};
