//! Carrier configuration module

use serde::{Deserialize, Serialize};

/// Carrier registration, health checking and send deadlines
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProvidersConfig {
    /// Seconds between health probes of every registered carrier
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_seconds: u64,

    /// Deadline for a single health probe
    #[serde(default = "default_health_check_timeout")]
    pub health_check_timeout_seconds: u64,

    /// Deadline for a single carrier send
    #[serde(default = "default_send_timeout")]
    pub send_timeout_seconds: u64,

    /// Twilio settings
    #[serde(default)]
    pub twilio: TwilioProviderConfig,

    /// Console/mock carrier, logs messages instead of delivering them
    #[serde(default)]
    pub mock: CarrierToggle,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            health_check_interval_seconds: default_health_check_interval(),
            health_check_timeout_seconds: default_health_check_timeout(),
            send_timeout_seconds: default_send_timeout(),
            twilio: TwilioProviderConfig::default(),
            mock: CarrierToggle::default(),
        }
    }
}

impl ProvidersConfig {
    /// Development preset: only the mock carrier is registered
    pub fn development() -> Self {
        Self {
            mock: CarrierToggle {
                enabled: true,
                priority: 100,
            },
            ..Default::default()
        }
    }
}

/// Enable flag and priority shared by every carrier (lower priority = preferred)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CarrierToggle {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub priority: i32,
}

/// Twilio account settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TwilioProviderConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_twilio_priority")]
    pub priority: i32,

    #[serde(default)]
    pub account_sid: String,

    #[serde(default)]
    pub auth_token: String,

    /// Sender number used when no messaging service is configured
    #[serde(default)]
    pub from_number: String,

    /// Messaging service SID, preferred over `from_number` when set
    #[serde(default)]
    pub messaging_service_sid: Option<String>,

    #[serde(default = "default_twilio_api_base")]
    pub api_base_url: String,
}

impl Default for TwilioProviderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            priority: default_twilio_priority(),
            account_sid: String::new(),
            auth_token: String::new(),
            from_number: String::new(),
            messaging_service_sid: None,
            api_base_url: default_twilio_api_base(),
        }
    }
}

fn default_health_check_interval() -> u64 {
    30
}

fn default_health_check_timeout() -> u64 {
    10
}

fn default_send_timeout() -> u64 {
    15
}

fn default_twilio_priority() -> i32 {
    1
}

fn default_twilio_api_base() -> String {
    String::from("https://api.twilio.com/2010-04-01")
}
