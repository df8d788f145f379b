//! Configuration module with gateway-specific sub-modules
//!
//! This module organizes configuration into logical areas:
//! - `cache` - Redis connection used for distributed counters and OTP records
//! - `environment` - Environment detection and logging configuration
//! - `otp` - One-time passcode issuance and verification policy
//! - `providers` - Carrier registration, health checking and send deadlines
//! - `rate_limit` - Quotas for OTP issuance and API usage

pub mod cache;
pub mod environment;
pub mod otp;
pub mod providers;
pub mod rate_limit;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// Re-export commonly used types
pub use cache::CacheConfig;
pub use environment::{Environment, LogFormat, LoggingConfig};
pub use otp::{OtpConfig, MAX_RESEND_COOLDOWN_SECONDS};
pub use providers::{CarrierToggle, ProvidersConfig, TwilioProviderConfig};
pub use rate_limit::RateLimitConfig;

/// Prefix for environment variable overrides (`SMSGW__OTP__LENGTH=8`)
pub const ENV_PREFIX: &str = "SMSGW";

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid configuration value for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    fn invalid(field: &str, reason: &str) -> Self {
        ConfigError::Invalid {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Complete gateway configuration combining all sub-configurations
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Environment configuration
    #[serde(default)]
    pub environment: Environment,

    /// Redis configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// OTP policy
    #[serde(default)]
    pub otp: OtpConfig,

    /// Carrier configuration
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Create configuration for development environment
    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            cache: CacheConfig::default(),
            rate_limit: RateLimitConfig::development(),
            otp: OtpConfig::default(),
            providers: ProvidersConfig::development(),
            logging: LoggingConfig::for_environment(Environment::Development),
        }
    }

    /// Create configuration for production environment
    pub fn production() -> Self {
        Self {
            environment: Environment::Production,
            cache: CacheConfig::new("redis://redis:6379"),
            rate_limit: RateLimitConfig::production(),
            otp: OtpConfig::default(),
            providers: ProvidersConfig::default(),
            logging: LoggingConfig::for_environment(Environment::Production),
        }
    }

    /// Load configuration from files and the process environment
    ///
    /// Sources are layered, later ones overriding earlier ones:
    /// 1. Built-in defaults
    /// 2. `config/default.toml` (optional)
    /// 3. `config/<environment>.toml` (optional)
    /// 4. `SMSGW__*` environment variables, `__` separating nested keys
    ///
    /// A `.env` file is read into the process environment first, if present.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let environment = Environment::from_env();
        Self::load_from_dir("config", environment)
    }

    /// Load configuration from an explicit directory and environment
    pub fn load_from_dir(dir: &str, environment: Environment) -> Result<Self, ConfigError> {
        let settings = ::config::Config::builder()
            .set_default("environment", environment.to_string())?
            .add_source(::config::File::with_name(&format!("{}/default", dir)).required(false))
            .add_source(
                ::config::File::with_name(&format!("{}/{}", dir, environment.config_file()))
                    .required(false),
            )
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;

        tracing::debug!(
            environment = %config.environment,
            rate_limit_enabled = config.rate_limit.enabled,
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Reject values the gateway cannot operate with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.otp.length == 0 || self.otp.length > 32 {
            return Err(ConfigError::invalid("otp.length", "must be between 1 and 32"));
        }
        if self.otp.max_attempts == 0 {
            return Err(ConfigError::invalid("otp.max_attempts", "must be at least 1"));
        }
        if self.otp.expiry_minutes == 0 {
            return Err(ConfigError::invalid("otp.expiry_minutes", "must be at least 1"));
        }
        if self.otp.resend_cooldown_seconds > MAX_RESEND_COOLDOWN_SECONDS {
            return Err(ConfigError::invalid(
                "otp.resend_cooldown_seconds",
                "must not exceed one day",
            ));
        }

        if self.rate_limit.enabled {
            let limits = [
                ("rate_limit.default_per_minute", self.rate_limit.default_per_minute),
                ("rate_limit.default_per_hour", self.rate_limit.default_per_hour),
                ("rate_limit.default_per_day", self.rate_limit.default_per_day),
                ("rate_limit.otp_per_minute", self.rate_limit.otp_per_minute),
                ("rate_limit.otp_per_hour", self.rate_limit.otp_per_hour),
                ("rate_limit.otp_per_phone_per_day", self.rate_limit.otp_per_phone_per_day),
            ];
            if let Some((field, _)) = limits.iter().find(|(_, value)| *value == 0) {
                return Err(ConfigError::invalid(field, "must be positive while rate limiting is enabled"));
            }
        }

        if self.providers.health_check_interval_seconds == 0 {
            return Err(ConfigError::invalid(
                "providers.health_check_interval_seconds",
                "must be at least 1",
            ));
        }
        if self.providers.send_timeout_seconds >= self.providers.health_check_interval_seconds {
            return Err(ConfigError::invalid(
                "providers.send_timeout_seconds",
                "must be shorter than the health check interval",
            ));
        }

        let twilio = &self.providers.twilio;
        if twilio.enabled && (twilio.account_sid.is_empty() || twilio.auth_token.is_empty()) {
            return Err(ConfigError::invalid(
                "providers.twilio",
                "account_sid and auth_token are required when enabled",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.otp.length, 6);
        assert_eq!(config.rate_limit.otp_per_phone_per_day, 5);
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(AppConfig::development().validate().is_ok());
        assert!(AppConfig::production().validate().is_ok());
    }

    #[test]
    fn test_zero_max_attempts_rejected() {
        let mut config = AppConfig::default();
        config.otp.max_attempts = 0;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("otp.max_attempts"));
    }

    #[test]
    fn test_resend_cooldown_is_bounded() {
        let mut config = AppConfig::default();
        config.otp.resend_cooldown_seconds = MAX_RESEND_COOLDOWN_SECONDS;
        assert!(config.validate().is_ok());

        config.otp.resend_cooldown_seconds = u64::MAX;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("otp.resend_cooldown_seconds"));
    }

    #[test]
    fn test_zero_limit_allowed_when_disabled() {
        let mut config = AppConfig::default();
        config.rate_limit.otp_per_minute = 0;
        assert!(config.validate().is_err());

        config.rate_limit.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_send_timeout_must_be_below_interval() {
        let mut config = AppConfig::default();
        config.providers.send_timeout_seconds = config.providers.health_check_interval_seconds;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_twilio_requires_credentials() {
        let mut config = AppConfig::default();
        config.providers.twilio.enabled = true;
        assert!(config.validate().is_err());

        config.providers.twilio.account_sid = "ACtest".to_string();
        config.providers.twilio.auth_token = "secret".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_missing_dir_uses_defaults() {
        let config = AppConfig::load_from_dir("does-not-exist", Environment::Staging).unwrap();
        assert_eq!(config.environment, Environment::Staging);
        assert_eq!(config.otp.max_attempts, 3);
        assert_eq!(config.providers.health_check_interval_seconds, 30);
    }
}
