//! Configuration management for the Daylog request guard.
//!
//! Values are layered: built-in defaults, then an optional YAML file, then
//! `DAYLOG__*` environment variables (e.g.
//! `DAYLOG__RATE_LIMITING__AUTH__MAX_REQUESTS=3`).

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use crate::error::{DaylogError, Result};

/// Environment variable prefix for configuration overrides.
const ENV_PREFIX: &str = "DAYLOG";
/// Separator between nested keys in environment variable names.
const ENV_SEPARATOR: &str = "__";
/// Largest drift tolerance accepted for TOTP validation, in steps.
const MAX_SKEW_STEPS: u32 = 10;

/// Main configuration for the Daylog request guard.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaylogConfig {
    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// CSRF cookie configuration
    #[serde(default)]
    pub csrf: CsrfConfig,

    /// TOTP configuration
    #[serde(default)]
    pub totp: TotpConfig,
}

/// Window, budget and sweep interval for one limiter instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Window length in milliseconds
    pub window_ms: u64,
    /// Requests admitted per key per window
    pub max_requests: u64,
    /// How often expired windows are swept, in milliseconds
    pub cleanup_interval_ms: u64,
}

impl LimiterConfig {
    pub const fn new(window_ms: u64, max_requests: u64, cleanup_interval_ms: u64) -> Self {
        Self {
            window_ms,
            max_requests,
            cleanup_interval_ms,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.max_requests == 0 {
            return Err(DaylogError::Config(format!(
                "rate_limiting.{name}.max_requests must be greater than zero"
            )));
        }
        if self.window_ms == 0 {
            return Err(DaylogError::Config(format!(
                "rate_limiting.{name}.window_ms must be greater than zero"
            )));
        }
        if self.cleanup_interval_ms == 0 {
            return Err(DaylogError::Config(format!(
                "rate_limiting.{name}.cleanup_interval_ms must be greater than zero"
            )));
        }
        Ok(())
    }
}

/// Rate limiting configuration, one entry per limiter instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Login, registration and MFA endpoints
    #[serde(default = "default_auth_limiter")]
    pub auth: LimiterConfig,

    /// General API traffic
    #[serde(default = "default_api_limiter")]
    pub api: LimiterConfig,

    /// Picture uploads
    #[serde(default = "default_upload_limiter")]
    pub upload: LimiterConfig,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            auth: default_auth_limiter(),
            api: default_api_limiter(),
            upload: default_upload_limiter(),
        }
    }
}

fn default_auth_limiter() -> LimiterConfig {
    // 5 attempts per 15 minutes
    LimiterConfig::new(15 * 60 * 1000, 5, 60 * 1000)
}

fn default_api_limiter() -> LimiterConfig {
    LimiterConfig::new(60 * 1000, 100, 60 * 1000)
}

fn default_upload_limiter() -> LimiterConfig {
    LimiterConfig::new(60 * 1000, 10, 30 * 1000)
}

/// CSRF cookie configuration.
///
/// The cookie name and header name are fixed, see [`crate::csrf`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsrfConfig {
    /// Set the `Secure` attribute; should mirror whether the site is served over HTTPS
    #[serde(default = "default_secure_cookies")]
    pub secure_cookies: bool,

    /// Cookie lifetime in seconds
    #[serde(default = "default_csrf_max_age")]
    pub max_age_secs: u64,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            secure_cookies: default_secure_cookies(),
            max_age_secs: default_csrf_max_age(),
        }
    }
}

fn default_secure_cookies() -> bool {
    true
}

fn default_csrf_max_age() -> u64 {
    60 * 60 * 24
}

/// TOTP configuration.
///
/// Step length and code length are fixed, see [`crate::totp`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TotpConfig {
    /// Number of adjacent time steps accepted on either side of now
    #[serde(default = "default_skew_steps")]
    pub skew_steps: u32,

    /// Issuer label shown by authenticator apps
    #[serde(default = "default_issuer")]
    pub issuer: String,
}

impl Default for TotpConfig {
    fn default() -> Self {
        Self {
            skew_steps: default_skew_steps(),
            issuer: default_issuer(),
        }
    }
}

fn default_skew_steps() -> u32 {
    1
}

fn default_issuer() -> String {
    "Daylog".to_string()
}

impl DaylogConfig {
    /// Load configuration from defaults, an optional YAML file and the environment.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&DaylogConfig::default())?);

        if let Some(path) = path {
            info!(path = %path, "Loading configuration file");
            builder = builder.add_source(config::File::new(path, config::FileFormat::Yaml));
        }

        let config: DaylogConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string, filling gaps with defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: DaylogConfig = config::Config::builder()
            .add_source(config::Config::try_from(&DaylogConfig::default())?)
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| DaylogError::Config(e.to_string()))
    }

    /// Render the effective rate limiter settings as pretty-printed JSON.
    pub fn limits_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.rate_limiting)
            .map_err(|e| DaylogError::Config(e.to_string()))
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        self.rate_limiting.auth.validate("auth")?;
        self.rate_limiting.api.validate("api")?;
        self.rate_limiting.upload.validate("upload")?;

        if self.totp.skew_steps > MAX_SKEW_STEPS {
            return Err(DaylogError::Config(format!(
                "totp.skew_steps must be at most {MAX_SKEW_STEPS}"
            )));
        }
        if self.totp.issuer.contains(':') {
            return Err(DaylogError::Config(
                "totp.issuer must not contain ':'".to_string(),
            ));
        }
        Ok(())
    }
}
