//! Shared utilities and common types for the SmsGate workspace
//!
//! This crate provides functionality used across the core and infrastructure crates:
//! - Configuration types and the layered configuration loader
//! - Logging bootstrap on top of `tracing-subscriber`
//! - Phone number utilities (E.164 validation, masking for logs)

pub mod config;
pub mod logging;
pub mod utils;

// Re-export commonly used items at crate root
pub use config::{
    AppConfig, CacheConfig, ConfigError, Environment, LoggingConfig, OtpConfig,
    ProvidersConfig, RateLimitConfig,
};
pub use logging::init_tracing;
pub use utils::phone;
