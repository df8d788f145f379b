//! Provider failover module
//!
//! This module provides multi-carrier SMS routing:
//! - The `CarrierAdapter` capability every carrier implements
//! - Priority-ordered registry with stable tie-breaking
//! - Failover across healthy carriers with per-call deadlines
//! - Background health probing for recovery

mod manager;
mod traits;

#[cfg(test)]
mod tests;

pub use manager::{ProviderManager, ProviderManagerConfig, ProviderStatus};
pub use traits::CarrierAdapter;
