//! Cache module for Redis-backed state
//!
//! This module provides the shared Redis client with retry logic, plus the
//! Redis implementations of the rate limit counter store and the OTP
//! repository.

pub mod counter_store;
pub mod otp_store;
pub mod redis_client;

#[cfg(test)]
mod tests;

pub use counter_store::RedisCounterStore;
pub use otp_store::RedisOtpRepository;
pub use redis_client::RedisClient;

// Re-export commonly used types
pub use sg_shared::config::CacheConfig;
