//! Rate limit keys, windows and decisions

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Fixed window granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RateWindow {
    Minute,
    Hour,
    Day,
}

impl RateWindow {
    pub fn duration(&self) -> Duration {
        match self {
            RateWindow::Minute => Duration::from_secs(60),
            RateWindow::Hour => Duration::from_secs(3600),
            RateWindow::Day => Duration::from_secs(86_400),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RateWindow::Minute => "minute",
            RateWindow::Hour => "hour",
            RateWindow::Day => "day",
        }
    }
}

/// Counter identity: scope, subject type, subject id and window
///
/// Renders as `otp:phone:+15551234567:day` or `api:key:abc:minute`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateWindowKey {
    pub scope: &'static str,
    pub subject_type: &'static str,
    pub subject_id: String,
    pub window: RateWindow,
}

impl RateWindowKey {
    pub fn otp_user(user_id: &str, window: RateWindow) -> Self {
        Self {
            scope: "otp",
            subject_type: "user",
            subject_id: user_id.to_string(),
            window,
        }
    }

    pub fn otp_phone(phone: &str, window: RateWindow) -> Self {
        Self {
            scope: "otp",
            subject_type: "phone",
            subject_id: phone.to_string(),
            window,
        }
    }

    pub fn api_key(api_key: &str, window: RateWindow) -> Self {
        Self {
            scope: "api",
            subject_type: "key",
            subject_id: api_key.to_string(),
            window,
        }
    }
}

impl fmt::Display for RateWindowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.scope,
            self.subject_type,
            self.subject_id,
            self.window.as_str()
        )
    }
}

/// Admission decision for one check (or the binding layer of a layered check)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitResult {
    pub allowed: bool,
    /// Counter key that produced this decision; `None` when unlimited
    pub key: Option<String>,
    pub limit: u32,
    /// `None` means unlimited
    pub remaining: Option<u32>,
    pub reset_at: Option<DateTime<Utc>>,
    /// Set only on rejection
    pub retry_after: Option<Duration>,
}

impl RateLimitResult {
    /// Allowed without any counting (rate limiting disabled)
    pub fn unlimited() -> Self {
        Self {
            allowed: true,
            key: None,
            limit: 0,
            remaining: None,
            reset_at: None,
            retry_after: None,
        }
    }

    pub(crate) fn from_count(key: &str, count: u64, limit: u32, ttl: Duration) -> Self {
        let allowed = count <= u64::from(limit);
        let remaining = u64::from(limit).saturating_sub(count) as u32;
        let reset_at = chrono::Duration::from_std(ttl)
            .ok()
            .map(|ttl| Utc::now() + ttl);

        Self {
            allowed,
            key: Some(key.to_string()),
            limit,
            remaining: Some(remaining),
            reset_at,
            retry_after: if allowed { None } else { Some(ttl) },
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.remaining.is_none()
    }

    /// Seconds to wait before retrying, rounded up
    pub fn retry_after_seconds(&self) -> u64 {
        self.retry_after
            .map(|d| d.as_secs() + u64::from(d.subsec_nanos() > 0))
            .unwrap_or(0)
    }
}
