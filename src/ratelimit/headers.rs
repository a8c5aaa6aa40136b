//! `X-RateLimit-*` response headers.

use chrono::{DateTime, Utc};
use http::header::{HeaderName, HeaderValue, RETRY_AFTER};
use http::HeaderMap;
use serde::Serialize;

use super::window::RateLimitDecision;

pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";

/// Header values describing a rate limit decision to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitHeaders {
    pub limit: u64,
    pub remaining: u64,
    /// Window end as an HTTP-date
    pub reset: String,
    /// Whole seconds until the window ends, rounded up.
    /// Zero or negative if it already has; callers clamp as needed.
    pub retry_after: i64,
}

impl RateLimitHeaders {
    /// Derive the headers for a window ending at `reset_time`.
    pub fn new(limit: u64, remaining: u64, reset_time: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let until_reset_ms = (reset_time - now).num_milliseconds();
        Self {
            limit,
            remaining,
            reset: http_date(reset_time),
            retry_after: ceil_div(until_reset_ms, 1000),
        }
    }

    pub fn from_decision(decision: &RateLimitDecision, now: DateTime<Utc>) -> Self {
        Self::new(decision.limit, decision.remaining, decision.reset_time, now)
    }

    /// Render as response headers. `Retry-After` is clamped at zero.
    pub fn to_header_map(&self) -> HeaderMap {
        let mut headers = HeaderMap::with_capacity(4);
        headers.insert(HeaderName::from_static(LIMIT_HEADER), HeaderValue::from(self.limit));
        headers.insert(
            HeaderName::from_static(REMAINING_HEADER),
            HeaderValue::from(self.remaining),
        );
        if let Ok(reset) = HeaderValue::from_str(&self.reset) {
            headers.insert(HeaderName::from_static(RESET_HEADER), reset);
        }
        headers.insert(RETRY_AFTER, HeaderValue::from(self.retry_after.max(0)));
        headers
    }
}

/// Format a timestamp as an IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn ceil_div(numerator: i64, denominator: i64) -> i64 {
    -((-numerator).div_euclid(denominator))
}
