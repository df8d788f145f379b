//! # SmsGate Core
//!
//! Domain layer of the SMS gateway: the OTP record and message types, the
//! carrier capability and failover manager, the layered rate limiter and the
//! OTP verification engine. Storage and carrier integrations live in
//! `sg_infra` behind the traits defined here.

pub mod domain;
pub mod errors;
pub mod repositories;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::*;
pub use errors::*;
pub use repositories::{InMemoryOtpRepository, OtpRepository};
pub use services::{
    CarrierAdapter, CounterSnapshot, CounterStore, MessageRenderer, OtpService, OtpServiceConfig,
    OtpTarget, ProviderManager, ProviderManagerConfig, ProviderStatus, RateLimitResult,
    RateLimiter, RateWindow, RateWindowKey, SendOtpRequest, SendOtpResponse, TemplateRenderer,
    VerifyOtpRequest, VerifyOtpResult,
};
