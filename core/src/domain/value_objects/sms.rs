//! Carrier-agnostic message value objects exchanged with carrier adapters.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classification of an outbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Transactional,
    Promotional,
    Otp,
}

impl Default for MessageType {
    fn default() -> Self {
        MessageType::Transactional
    }
}

/// Normalised delivery status; adapters map vendor vocabularies onto it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Queued,
    Sent,
    Delivered,
    Failed,
    Expired,
    Rejected,
    Unknown,
}

impl DeliveryStatus {
    /// No further status change is expected
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            DeliveryStatus::Delivered
                | DeliveryStatus::Failed
                | DeliveryStatus::Expired
                | DeliveryStatus::Rejected
        )
    }
}

/// Outbound message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendRequest {
    /// Destination number
    pub to: String,

    /// Sender id or number; the adapter default is used when absent
    pub from: Option<String>,

    pub message: String,

    #[serde(default)]
    pub message_type: MessageType,

    pub scheduled_at: Option<DateTime<Utc>>,

    /// Where the carrier should post delivery reports
    pub callback_url: Option<String>,

    /// Seconds the carrier may keep retrying delivery
    pub validity_period: Option<u32>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl SendRequest {
    pub fn new(to: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            from: None,
            message: message.into(),
            message_type: MessageType::default(),
            scheduled_at: None,
            callback_url: None,
            validity_period: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_type(mut self, message_type: MessageType) -> Self {
        self.message_type = message_type;
        self
    }

    pub fn with_callback(mut self, url: impl Into<String>) -> Self {
        self.callback_url = Some(url.into());
        self
    }

    pub fn scheduled(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(at);
        self
    }
}

/// Result of a successful hand-off to a carrier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendResponse {
    /// Carrier-assigned message id
    pub message_id: String,

    /// Name of the carrier that accepted the message
    pub provider: String,

    pub status: DeliveryStatus,

    pub status_message: Option<String>,

    pub segment_count: u32,

    pub cost: Option<f64>,

    pub currency: Option<String>,

    pub sent_at: DateTime<Utc>,
}

/// Delivery receipt, either polled or received by webhook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub message_id: String,
    pub provider: String,
    pub status: DeliveryStatus,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Account balance reported by a carrier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceInfo {
    pub provider: String,
    pub balance: f64,
    pub currency: String,
    pub updated_at: DateTime<Utc>,
}

/// Number of SMS segments needed for `message`
///
/// GSM-7 text fits 160 characters in one segment and 153 per segment when
/// concatenated; anything else is sent as UCS-2 with 70 and 67.
pub fn segment_count(message: &str) -> u32 {
    let chars = message.chars().count();
    if chars == 0 {
        return 1;
    }
    let (single, multi) = if message.is_ascii() { (160, 153) } else { (70, 67) };
    if chars <= single {
        1
    } else {
        ((chars + multi - 1) / multi) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_count() {
        assert_eq!(segment_count(""), 1);
        assert_eq!(segment_count(&"a".repeat(160)), 1);
        assert_eq!(segment_count(&"a".repeat(161)), 2);
        assert_eq!(segment_count(&"a".repeat(306)), 2);
        assert_eq!(segment_count(&"a".repeat(307)), 3);
        assert_eq!(segment_count(&"é".repeat(70)), 1);
        assert_eq!(segment_count(&"é".repeat(71)), 2);
    }

    #[test]
    fn test_final_statuses() {
        assert!(DeliveryStatus::Delivered.is_final());
        assert!(DeliveryStatus::Rejected.is_final());
        assert!(!DeliveryStatus::Queued.is_final());
        assert!(!DeliveryStatus::Unknown.is_final());
    }

    #[test]
    fn test_send_request_builder() {
        let at = Utc::now();
        let request = SendRequest::new("+15551234567", "hello")
            .with_type(MessageType::Otp)
            .with_callback("https://example.com/dlr")
            .scheduled(at);

        assert_eq!(request.message_type, MessageType::Otp);
        assert_eq!(request.callback_url.as_deref(), Some("https://example.com/dlr"));
        assert_eq!(request.scheduled_at, Some(at));
        assert!(request.from.is_none());
    }
}
