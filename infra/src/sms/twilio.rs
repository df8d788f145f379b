//! Twilio carrier adapter
//!
//! Talks to the Twilio REST API directly over `reqwest`:
//!
//! - Form-encoded sends, through a messaging service when one is configured
//! - Status callbacks and scheduled sends
//! - Message status and account balance lookups
//! - Account lookup as health probe
//! - Parsing of form-encoded status callbacks

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, error, info};

use sg_core::domain::value_objects::{
    BalanceInfo, DeliveryReport, DeliveryStatus, SendRequest, SendResponse,
};
use sg_core::errors::ProviderError;
use sg_core::services::providers::CarrierAdapter;
use sg_shared::config::TwilioProviderConfig;
use sg_shared::utils::phone::{mask_phone_number, to_e164};

use crate::InfrastructureError;

/// Name under which the Twilio carrier registers
pub const TWILIO_PROVIDER_NAME: &str = "twilio";

/// Twilio rejects bodies longer than this
const MAX_MESSAGE_LENGTH: usize = 1600;

/// Default HTTP timeout for Twilio API calls
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Twilio connection settings
#[derive(Debug, Clone)]
pub struct TwilioConfig {
    /// Twilio Account SID
    pub account_sid: String,
    /// Twilio Auth Token
    pub auth_token: String,
    /// Sender number, used when no messaging service is set
    pub from_number: String,
    /// Messaging service SID; enables scheduling
    pub messaging_service_sid: Option<String>,
    /// API root, overridable for tests
    pub api_base_url: String,
    /// Timeout for API requests in seconds
    pub request_timeout_secs: u64,
}

impl From<&TwilioProviderConfig> for TwilioConfig {
    fn from(config: &TwilioProviderConfig) -> Self {
        Self {
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            from_number: config.from_number.clone(),
            messaging_service_sid: config
                .messaging_service_sid
                .clone()
                .filter(|sid| !sid.trim().is_empty()),
            api_base_url: config.api_base_url.clone(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// Message resource as returned by the Messages endpoints
#[derive(Debug, Deserialize)]
struct TwilioMessage {
    sid: String,
    status: String,
    #[serde(default)]
    num_segments: Option<String>,
    #[serde(default)]
    price: Option<String>,
    #[serde(default)]
    price_unit: Option<String>,
    #[serde(default)]
    error_code: Option<serde_json::Value>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TwilioBalance {
    balance: String,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct TwilioApiError {
    code: Option<i64>,
    message: String,
}

/// Form body Twilio posts to a status callback URL
#[derive(Debug, Deserialize)]
struct TwilioStatusCallback {
    #[serde(rename = "MessageSid")]
    message_sid: Option<String>,
    #[serde(rename = "MessageStatus")]
    message_status: Option<String>,
    #[serde(rename = "ErrorCode")]
    error_code: Option<String>,
    #[serde(rename = "ErrorMessage")]
    error_message: Option<String>,
}

/// Twilio REST carrier
pub struct TwilioCarrier {
    config: TwilioConfig,
    http: reqwest::Client,
}

impl TwilioCarrier {
    /// Create a new Twilio carrier
    pub fn new(config: TwilioConfig) -> Result<Self, InfrastructureError> {
        if config.account_sid.trim().is_empty() || config.auth_token.trim().is_empty() {
            return Err(InfrastructureError::Config(
                "Twilio account SID and auth token are required".to_string(),
            ));
        }
        if config.messaging_service_sid.is_none() && !config.from_number.starts_with('+') {
            return Err(InfrastructureError::Config(
                "Twilio from number must be in E.164 format (starting with '+')".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        info!(
            from = %mask_phone_number(&config.from_number),
            messaging_service = config.messaging_service_sid.is_some(),
            "Twilio carrier initialized"
        );

        Ok(Self { config, http })
    }

    fn account_url(&self) -> String {
        format!(
            "{}/Accounts/{}",
            self.config.api_base_url.trim_end_matches('/'),
            self.config.account_sid
        )
    }

    /// Form fields for a send
    pub(crate) fn send_form(&self, request: &SendRequest, to: &str) -> Vec<(&'static str, String)> {
        let mut form = vec![("To", to.to_string()), ("Body", request.message.clone())];

        match &self.config.messaging_service_sid {
            Some(sid) => form.push(("MessagingServiceSid", sid.clone())),
            None => {
                let from = request
                    .from
                    .clone()
                    .unwrap_or_else(|| self.config.from_number.clone());
                form.push(("From", from));
            }
        }

        if let Some(callback) = &request.callback_url {
            form.push(("StatusCallback", callback.clone()));
        }
        if let Some(validity) = request.validity_period {
            form.push(("ValidityPeriod", validity.to_string()));
        }
        // Scheduling needs a messaging service
        if let (Some(at), true) = (request.scheduled_at, self.supports_scheduling()) {
            form.push(("ScheduleType", "fixed".to_string()));
            form.push(("SendAt", at.to_rfc3339()));
        }

        form
    }

    fn failure(&self, reason: impl Into<String>) -> ProviderError {
        ProviderError::DeliveryFailed {
            provider: TWILIO_PROVIDER_NAME.to_string(),
            reason: reason.into(),
        }
    }

    /// Turn a non-success response into a carrier error
    async fn api_error(&self, response: reqwest::Response) -> ProviderError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<TwilioApiError>(&body) {
            Ok(err) => self.failure(format!(
                "twilio error {}: {}",
                err.code.unwrap_or_else(|| i64::from(status.as_u16())),
                err.message
            )),
            Err(_) => self.failure(format!("twilio request failed with status {}", status)),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ProviderError> {
        let response = self
            .http
            .get(url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .send()
            .await
            .map_err(|e| self.failure(e.to_string()))?;

        if !response.status().is_success() {
            return Err(self.api_error(response).await);
        }

        response
            .json::<T>()
            .await
            .map_err(|e| self.failure(format!("failed to parse response: {}", e)))
    }
}

/// Map Twilio's status vocabulary onto [`DeliveryStatus`]
pub fn map_twilio_status(status: &str) -> DeliveryStatus {
    match status.to_ascii_lowercase().as_str() {
        "accepted" | "queued" | "sending" | "scheduled" => DeliveryStatus::Queued,
        "sent" => DeliveryStatus::Sent,
        "delivered" => DeliveryStatus::Delivered,
        "undelivered" | "failed" => DeliveryStatus::Failed,
        "canceled" => DeliveryStatus::Expired,
        _ => DeliveryStatus::Unknown,
    }
}

#[async_trait]
impl CarrierAdapter for TwilioCarrier {
    fn name(&self) -> &str {
        TWILIO_PROVIDER_NAME
    }

    async fn send(&self, request: &SendRequest) -> Result<SendResponse, ProviderError> {
        let to = self.validate_phone_number(&request.to)?;

        let length = request.message.chars().count();
        if length > MAX_MESSAGE_LENGTH {
            return Err(ProviderError::MessageTooLong {
                length,
                max: MAX_MESSAGE_LENGTH,
            });
        }

        debug!(to = %mask_phone_number(&to), length, "Sending SMS via Twilio");

        let url = format!("{}/Messages.json", self.account_url());
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&self.send_form(request, &to))
            .send()
            .await
            .map_err(|e| {
                error!(to = %mask_phone_number(&to), error = %e, "Twilio request failed");
                self.failure(e.to_string())
            })?;

        if !response.status().is_success() {
            return Err(self.api_error(response).await);
        }

        let message: TwilioMessage = response
            .json()
            .await
            .map_err(|e| self.failure(format!("failed to parse response: {}", e)))?;

        Ok(SendResponse {
            status: map_twilio_status(&message.status),
            status_message: Some(message.status),
            segment_count: message
                .num_segments
                .as_deref()
                .and_then(|n| n.parse().ok())
                .unwrap_or(1),
            cost: message
                .price
                .as_deref()
                .and_then(|p| p.parse::<f64>().ok())
                .map(f64::abs),
            currency: message.price_unit,
            message_id: message.sid,
            provider: TWILIO_PROVIDER_NAME.to_string(),
            sent_at: Utc::now(),
        })
    }

    async fn get_status(&self, message_id: &str) -> Result<DeliveryReport, ProviderError> {
        let url = format!("{}/Messages/{}.json", self.account_url(), message_id);
        let message: TwilioMessage = self.get_json(&url).await?;
        let status = map_twilio_status(&message.status);
        let now = Utc::now();

        Ok(DeliveryReport {
            message_id: message_id.to_string(),
            provider: TWILIO_PROVIDER_NAME.to_string(),
            status,
            error_code: message.error_code.and_then(|code| match code {
                serde_json::Value::Null => None,
                serde_json::Value::String(s) => Some(s),
                other => Some(other.to_string()),
            }),
            error_message: message.error_message,
            delivered_at: (status == DeliveryStatus::Delivered).then_some(now),
            updated_at: now,
        })
    }

    async fn get_balance(&self) -> Result<BalanceInfo, ProviderError> {
        let url = format!("{}/Balance.json", self.account_url());
        let balance: TwilioBalance = self.get_json(&url).await?;

        Ok(BalanceInfo {
            provider: TWILIO_PROVIDER_NAME.to_string(),
            balance: balance.balance.parse().unwrap_or(0.0),
            currency: balance.currency,
            updated_at: Utc::now(),
        })
    }

    fn validate_phone_number(&self, raw: &str) -> Result<String, ProviderError> {
        to_e164(raw).ok_or_else(|| ProviderError::InvalidPhoneNumber {
            phone: mask_phone_number(raw),
        })
    }

    fn parse_webhook(&self, payload: &[u8]) -> Result<DeliveryReport, ProviderError> {
        let callback: TwilioStatusCallback =
            serde_urlencoded::from_bytes(payload).map_err(|e| ProviderError::InvalidWebhook {
                reason: format!("form decode: {}", e),
            })?;

        let message_id = callback
            .message_sid
            .filter(|sid| !sid.is_empty())
            .ok_or_else(|| ProviderError::InvalidWebhook {
                reason: "missing MessageSid".to_string(),
            })?;

        let status = map_twilio_status(callback.message_status.as_deref().unwrap_or_default());
        let now = Utc::now();

        Ok(DeliveryReport {
            message_id,
            provider: TWILIO_PROVIDER_NAME.to_string(),
            status,
            error_code: callback.error_code.filter(|c| !c.is_empty()),
            error_message: callback.error_message.filter(|m| !m.is_empty()),
            delivered_at: (status == DeliveryStatus::Delivered).then_some(now),
            updated_at: now,
        })
    }

    async fn is_healthy(&self) -> bool {
        let url = format!("{}.json", self.account_url());
        match self
            .http
            .get(&url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .send()
            .await
        {
            Ok(response) => response.status() == reqwest::StatusCode::OK,
            Err(e) => {
                debug!(error = %e, "Twilio health probe failed");
                false
            }
        }
    }

    fn max_message_length(&self) -> usize {
        MAX_MESSAGE_LENGTH
    }

    fn supports_scheduling(&self) -> bool {
        self.config.messaging_service_sid.is_some()
    }
}
