//! The limiter instances the app runs with.

use std::sync::Arc;
use tracing::info;

use super::limiter::RateLimiter;
use crate::clock::{Clock, SystemClock};
use crate::config::RateLimitingConfig;

/// Which endpoint class a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimiterKind {
    /// Login, registration and MFA verification (strict)
    Auth,
    /// General API traffic (lenient)
    Api,
    /// Picture uploads (moderate)
    Upload,
}

impl LimiterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimiterKind::Auth => "auth",
            LimiterKind::Api => "api",
            LimiterKind::Upload => "upload",
        }
    }
}

impl std::str::FromStr for LimiterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auth" => Ok(LimiterKind::Auth),
            "api" => Ok(LimiterKind::Api),
            "upload" => Ok(LimiterKind::Upload),
            other => Err(format!("unknown limiter '{}', expected auth, api or upload", other)),
        }
    }
}

/// The auth, api and upload limiters, built once at startup and handed to
/// whatever composes the request pipeline.
pub struct LimiterSet {
    pub auth: RateLimiter,
    pub api: RateLimiter,
    pub upload: RateLimiter,
}

impl LimiterSet {
    pub fn from_config(config: &RateLimitingConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &RateLimitingConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            auth: RateLimiter::with_clock(LimiterKind::Auth.as_str(), config.auth, clock.clone()),
            api: RateLimiter::with_clock(LimiterKind::Api.as_str(), config.api, clock.clone()),
            upload: RateLimiter::with_clock(LimiterKind::Upload.as_str(), config.upload, clock),
        }
    }

    pub fn get(&self, kind: LimiterKind) -> &RateLimiter {
        match kind {
            LimiterKind::Auth => &self.auth,
            LimiterKind::Api => &self.api,
            LimiterKind::Upload => &self.upload,
        }
    }

    /// Tear down all three limiters.
    pub fn shutdown(&self) {
        self.auth.shutdown();
        self.api.shutdown();
        self.upload.shutdown();
        info!("Rate limiters shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::LimiterConfig;

    #[test]
    fn test_presets_follow_config() {
        let config = RateLimitingConfig {
            auth: LimiterConfig::new(60_000, 2, 60_000),
            ..RateLimitingConfig::default()
        };
        let set = LimiterSet::with_clock(&config, Arc::new(ManualClock::default()));

        assert_eq!(set.get(LimiterKind::Auth).limit(), 2);
        assert_eq!(set.get(LimiterKind::Api).limit(), 100);
        assert_eq!(set.get(LimiterKind::Upload).limit(), 10);
        assert_eq!(set.get(LimiterKind::Upload).name(), "upload");
    }

    #[test]
    fn test_limiters_do_not_share_state() {
        let config = RateLimitingConfig {
            auth: LimiterConfig::new(60_000, 1, 60_000),
            ..RateLimitingConfig::default()
        };
        let set = LimiterSet::with_clock(&config, Arc::new(ManualClock::default()));

        assert!(set.auth.is_allowed("ip:/login").allowed);
        assert!(!set.auth.is_allowed("ip:/login").allowed);
        assert!(set.api.is_allowed("ip:/login").allowed);
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("auth".parse::<LimiterKind>().unwrap(), LimiterKind::Auth);
        assert_eq!("upload".parse::<LimiterKind>().unwrap(), LimiterKind::Upload);
        assert!("uploads".parse::<LimiterKind>().is_err());
    }

    #[tokio::test]
    async fn test_shutdown_stops_all_sweeps() {
        let set = LimiterSet::from_config(&RateLimitingConfig::default());
        assert!(set.api.is_sweeping());

        set.shutdown();
        assert!(!set.auth.is_sweeping());
        assert!(!set.api.is_sweeping());
        assert!(!set.upload.is_sweeping());
    }
}
