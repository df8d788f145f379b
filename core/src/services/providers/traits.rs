//! Carrier adapter capability consumed by the provider manager

use async_trait::async_trait;

use crate::domain::value_objects::{BalanceInfo, DeliveryReport, SendRequest, SendResponse};
use crate::errors::ProviderError;

/// Uniform capability set every SMS carrier implements
///
/// The manager only ever talks to carriers through this trait; vendor identity
/// is used for logging and explicit routing, never for branching.
#[async_trait]
pub trait CarrierAdapter: Send + Sync {
    /// Stable registry name (e.g. "twilio")
    fn name(&self) -> &str;

    /// Hand one message to the carrier
    async fn send(&self, request: &SendRequest) -> Result<SendResponse, ProviderError>;

    /// Hand several messages to the carrier, stopping at the first rejection
    async fn send_bulk(&self, requests: &[SendRequest]) -> Result<Vec<SendResponse>, ProviderError> {
        let mut responses = Vec::with_capacity(requests.len());
        for request in requests {
            responses.push(self.send(request).await?);
        }
        Ok(responses)
    }

    /// Poll the carrier for the delivery status of a message it accepted
    async fn get_status(&self, message_id: &str) -> Result<DeliveryReport, ProviderError>;

    /// Current account balance
    async fn get_balance(&self) -> Result<BalanceInfo, ProviderError>;

    /// Normalise a raw number into the format the carrier accepts
    fn validate_phone_number(&self, raw: &str) -> Result<String, ProviderError>;

    /// Parse a delivery-report callback body
    fn parse_webhook(&self, payload: &[u8]) -> Result<DeliveryReport, ProviderError>;

    /// Lightweight reachability probe used by the health-check loop
    async fn is_healthy(&self) -> bool;

    /// Longest message body the carrier accepts, in characters
    fn max_message_length(&self) -> usize;

    fn supports_scheduling(&self) -> bool;
}
