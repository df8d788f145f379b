//! Carrier adapters
//!
//! Implementations of [`CarrierAdapter`](sg_core::services::providers::CarrierAdapter)
//! registered with the provider manager:
//!
//! - **Mock**: logs messages instead of delivering them, for development
//! - **Twilio**: production SMS through the Twilio REST API

pub mod mock_carrier;
pub mod twilio;

pub use mock_carrier::{MockCarrier, SentMessage, MOCK_PROVIDER_NAME};
pub use twilio::{map_twilio_status, TwilioCarrier, TwilioConfig, TWILIO_PROVIDER_NAME};

#[cfg(test)]
mod tests;
