//! Mock carrier for development
//!
//! Logs outgoing messages with a masked destination instead of delivering them
//! and keeps a record of every send. Failures can be switched on to exercise
//! failover.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use sg_core::domain::value_objects::{
    segment_count, BalanceInfo, DeliveryReport, DeliveryStatus, SendRequest, SendResponse,
};
use sg_core::errors::ProviderError;
use sg_core::services::providers::CarrierAdapter;
use sg_shared::utils::phone::{mask_phone_number, to_e164};

/// Name under which the mock carrier registers
pub const MOCK_PROVIDER_NAME: &str = "mock";

/// Longest message the mock accepts
const MAX_MESSAGE_LENGTH: usize = 1600;

/// A message accepted by the mock carrier
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub message_id: String,
    pub to: String,
    pub message: String,
    pub sent_at: DateTime<Utc>,
}

/// Status callback body understood by the mock carrier
#[derive(Debug, Deserialize)]
struct MockWebhook {
    message_id: String,
    status: DeliveryStatus,
    error_code: Option<String>,
    error_message: Option<String>,
}

/// Always-available carrier that only logs
pub struct MockCarrier {
    name: String,
    sent: Mutex<Vec<SentMessage>>,
    counter: AtomicU64,
    simulate_failure: AtomicBool,
}

impl MockCarrier {
    pub fn new() -> Self {
        Self::with_name(MOCK_PROVIDER_NAME)
    }

    /// A mock registered under a different name, for multi-carrier setups
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sent: Mutex::new(Vec::new()),
            counter: AtomicU64::new(0),
            simulate_failure: AtomicBool::new(false),
        }
    }

    /// Make sends fail and health probes report unhealthy
    pub fn set_simulate_failure(&self, fail: bool) {
        self.simulate_failure.store(fail, Ordering::SeqCst);
    }

    /// Messages accepted so far
    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }

    pub fn get_message_count(&self) -> usize {
        self.sent.lock().map(|sent| sent.len()).unwrap_or(0)
    }

    pub fn reset(&self) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.clear();
        }
    }

    fn find(&self, message_id: &str) -> Option<SentMessage> {
        self.sent
            .lock()
            .ok()?
            .iter()
            .find(|m| m.message_id == message_id)
            .cloned()
    }
}

impl Default for MockCarrier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CarrierAdapter for MockCarrier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, request: &SendRequest) -> Result<SendResponse, ProviderError> {
        let to = self.validate_phone_number(&request.to)?;

        if request.message.chars().count() > MAX_MESSAGE_LENGTH {
            return Err(ProviderError::MessageTooLong {
                length: request.message.chars().count(),
                max: MAX_MESSAGE_LENGTH,
            });
        }

        if self.simulate_failure.load(Ordering::SeqCst) {
            return Err(ProviderError::DeliveryFailed {
                provider: self.name.clone(),
                reason: "simulated failure".to_string(),
            });
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let message_id = format!("{}_{}_{}", self.name, Utc::now().timestamp_millis(), n);
        let sent_at = Utc::now();

        info!(
            provider = %self.name,
            to = %mask_phone_number(&to),
            message_id = %message_id,
            length = request.message.chars().count(),
            "Mock SMS accepted (not delivered)"
        );

        if let Ok(mut sent) = self.sent.lock() {
            sent.push(SentMessage {
                message_id: message_id.clone(),
                to,
                message: request.message.clone(),
                sent_at,
            });
        }

        Ok(SendResponse {
            message_id,
            provider: self.name.clone(),
            status: DeliveryStatus::Sent,
            status_message: Some("mock".to_string()),
            segment_count: segment_count(&request.message),
            cost: Some(0.0),
            currency: Some("USD".to_string()),
            sent_at,
        })
    }

    async fn get_status(&self, message_id: &str) -> Result<DeliveryReport, ProviderError> {
        let message = self
            .find(message_id)
            .ok_or_else(|| ProviderError::DeliveryFailed {
                provider: self.name.clone(),
                reason: format!("unknown message id {}", message_id),
            })?;

        Ok(DeliveryReport {
            message_id: message.message_id,
            provider: self.name.clone(),
            status: DeliveryStatus::Delivered,
            error_code: None,
            error_message: None,
            delivered_at: Some(message.sent_at),
            updated_at: Utc::now(),
        })
    }

    async fn get_balance(&self) -> Result<BalanceInfo, ProviderError> {
        Ok(BalanceInfo {
            provider: self.name.clone(),
            balance: f64::MAX,
            currency: "USD".to_string(),
            updated_at: Utc::now(),
        })
    }

    fn validate_phone_number(&self, raw: &str) -> Result<String, ProviderError> {
        to_e164(raw).ok_or_else(|| ProviderError::InvalidPhoneNumber {
            phone: mask_phone_number(raw),
        })
    }

    fn parse_webhook(&self, payload: &[u8]) -> Result<DeliveryReport, ProviderError> {
        let webhook: MockWebhook =
            serde_json::from_slice(payload).map_err(|e| ProviderError::InvalidWebhook {
                reason: e.to_string(),
            })?;

        let now = Utc::now();
        Ok(DeliveryReport {
            message_id: webhook.message_id,
            provider: self.name.clone(),
            delivered_at: (webhook.status == DeliveryStatus::Delivered).then_some(now),
            status: webhook.status,
            error_code: webhook.error_code,
            error_message: webhook.error_message,
            updated_at: now,
        })
    }

    async fn is_healthy(&self) -> bool {
        !self.simulate_failure.load(Ordering::SeqCst)
    }

    fn max_message_length(&self) -> usize {
        MAX_MESSAGE_LENGTH
    }

    fn supports_scheduling(&self) -> bool {
        false
    }
}

