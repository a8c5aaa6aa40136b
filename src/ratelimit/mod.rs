//! Fixed-window rate limiting.

mod client;
mod headers;
mod limiter;
mod presets;
mod window;

pub use client::{client_ip, limiter_key, request_key, UNKNOWN_CLIENT};
pub use headers::{http_date, RateLimitHeaders};
pub use limiter::RateLimiter;
pub use presets::{LimiterKind, LimiterSet};
pub use window::{RateLimitDecision, RateWindow};
