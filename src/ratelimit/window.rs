//! Fixed-window counter state.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Counter for one limiter key within the current fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    /// Requests admitted in this window
    pub count: u64,
    /// When this window ends and the counter starts over
    pub reset_time: DateTime<Utc>,
}

impl RateWindow {
    /// Open a fresh window holding the request that opened it.
    pub fn open(now: DateTime<Utc>, length: chrono::Duration) -> Self {
        Self {
            count: 1,
            reset_time: now.checked_add_signed(length).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// A window is expired once `now` reaches its reset time.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.reset_time
    }

    /// Count one more request if the budget allows it.
    ///
    /// Returns `true` if the request is within the limit, `false` if over limit.
    /// A rejected request does not touch the counter.
    pub fn try_admit(&mut self, limit: u64) -> bool {
        if self.count >= limit {
            return false;
        }
        self.count += 1;
        true
    }

    /// Get the remaining quota.
    pub fn remaining(&self, limit: u64) -> u64 {
        limit.saturating_sub(self.count)
    }
}

/// Outcome of a single rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// When the key's current window ends
    pub reset_time: DateTime<Utc>,
    /// Requests still admissible in the current window
    pub remaining: u64,
    /// Configured budget per window
    pub limit: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    #[test]
    fn test_open_counts_first_request() {
        let window = RateWindow::open(at(1_000), chrono::Duration::milliseconds(500));
        assert_eq!(window.count, 1);
        assert_eq!(window.reset_time, at(1_500));
        assert_eq!(window.remaining(3), 2);
    }

    #[test]
    fn test_try_admit_stops_at_limit() {
        let mut window = RateWindow::open(at(0), chrono::Duration::seconds(60));

        assert!(window.try_admit(3));
        assert!(window.try_admit(3));
        assert_eq!(window.remaining(3), 0);

        // Rejections leave the counter alone
        assert!(!window.try_admit(3));
        assert_eq!(window.count, 3);
    }

    #[test]
    fn test_expiry_is_inclusive() {
        let window = RateWindow::open(at(0), chrono::Duration::milliseconds(100));
        assert!(!window.is_expired(at(99)));
        assert!(window.is_expired(at(100)));
        assert!(window.is_expired(at(101)));
    }
}
