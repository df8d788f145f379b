//! Value objects representing immutable domain concepts.

pub mod sms;

// Re-export commonly used types
pub use sms::{
    segment_count, BalanceInfo, DeliveryReport, DeliveryStatus, MessageType, SendRequest,
    SendResponse,
};
