//! Rate limiting module
//!
//! Fixed-window quotas enforced at several granularities at once, counted in a
//! shared store when one is available and in process otherwise.

mod limiter;
mod store;
mod types;

#[cfg(test)]
mod tests;

pub use limiter::RateLimiter;
pub use store::{CounterSnapshot, CounterStore};
pub use types::{RateLimitResult, RateWindow, RateWindowKey};
