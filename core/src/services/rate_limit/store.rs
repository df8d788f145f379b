//! Distributed counter store consumed by the rate limiter

use std::time::Duration;

use async_trait::async_trait;

use crate::errors::DomainResult;

/// Counter value and remaining lifetime after an increment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub count: u64,
    pub ttl: Duration,
}

/// Shared fixed-window counters, atomic per key
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment `key`, setting its expiry to `window` when the counter is new,
    /// and return the new count with the remaining time to live
    async fn increment_with_expiry(&self, key: &str, window: Duration)
        -> DomainResult<CounterSnapshot>;

    /// Current count without incrementing (0 when absent)
    async fn get_count(&self, key: &str) -> DomainResult<u64>;

    async fn delete(&self, key: &str) -> DomainResult<()>;
}
