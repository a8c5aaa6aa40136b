//! Time-based one-time passwords (RFC 6238, HMAC-SHA1).

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha1::Sha1;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::debug;
use url::Url;

use super::base32;
use crate::clock::{Clock, SystemClock};
use crate::config::TotpConfig;
use crate::error::{DaylogError, Result};

type HmacSha1 = Hmac<Sha1>;

/// Seconds per time step.
pub const STEP_SECS: i64 = 30;
/// Digits per code.
pub const CODE_DIGITS: usize = 6;
/// Random bytes per secret (160 bits).
pub const SECRET_BYTES: usize = 20;
/// Steps accepted on either side of the current one by default.
pub const DEFAULT_SKEW_STEPS: u32 = 1;

const CODE_MODULUS: u32 = 1_000_000;

/// Generate a new shared secret, base32 encoded without padding.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    base32::encode(&bytes)
}

/// Time step counter for `at`: whole 30 second periods since the Unix epoch.
pub fn time_step(at: DateTime<Utc>) -> Result<u64> {
    u64::try_from(at.timestamp().div_euclid(STEP_SECS))
        .map_err(|_| DaylogError::InvalidInput("time is before the Unix epoch".to_string()))
}

/// HOTP value for one counter, before formatting.
///
/// HMAC-SHA1 over the big-endian counter, then dynamic truncation: the low
/// nibble of the last byte picks a 4-byte window, whose top bit is masked.
pub fn hotp(key: &[u8], counter: u64) -> Result<u32> {
    let mut mac = HmacSha1::new_from_slice(key).map_err(|e| DaylogError::Crypto(e.to_string()))?;
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let window = [
        digest[offset],
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ];
    Ok((u32::from_be_bytes(window) & 0x7fff_ffff) % CODE_MODULUS)
}

fn format_code(value: u32) -> String {
    format!("{:0width$}", value, width = CODE_DIGITS)
}

fn decode_secret(secret: &str) -> Result<Vec<u8>> {
    let key = base32::decode(secret)?;
    if key.is_empty() {
        return Err(DaylogError::InvalidInput("TOTP secret is empty".to_string()));
    }
    Ok(key)
}

fn is_well_formed(code: &str) -> bool {
    code.len() == CODE_DIGITS && code.bytes().all(|b| b.is_ascii_digit())
}

/// Derives and checks TOTP codes.
///
/// Stateless apart from configuration; a single engine can serve every
/// request concurrently.
pub struct TotpEngine {
    skew_steps: u32,
    issuer: String,
    clock: Arc<dyn Clock>,
}

impl TotpEngine {
    pub fn new(config: &TotpConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &TotpConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            skew_steps: config.skew_steps,
            issuer: config.issuer.clone(),
            clock,
        }
    }

    pub fn generate_secret(&self) -> String {
        generate_secret()
    }

    /// Code for `secret` at `time`, or now when `time` is `None`.
    ///
    /// Fails only if the secret is not valid base32.
    pub fn generate_code(&self, secret: &str, time: Option<DateTime<Utc>>) -> Result<String> {
        let key = decode_secret(secret)?;
        let counter = time_step(time.unwrap_or_else(|| self.clock.now()))?;
        Ok(format_code(hotp(&key, counter)?))
    }

    /// Check `code` against the current time step and `window` steps either
    /// side of it (the configured skew when `None`).
    ///
    /// A wrong, empty or malformed code is `Ok(false)`. `Err` means the
    /// secret itself is corrupt.
    pub fn validate_code(&self, secret: &str, code: &str, window: Option<u32>) -> Result<bool> {
        self.validate_code_at(secret, code, self.clock.now(), window)
    }

    /// [`validate_code`](Self::validate_code) as seen at time `at`.
    pub fn validate_code_at(
        &self,
        secret: &str,
        code: &str,
        at: DateTime<Utc>,
        window: Option<u32>,
    ) -> Result<bool> {
        let key = decode_secret(secret)?;

        let code = code.trim();
        if !is_well_formed(code) {
            debug!("Rejected malformed TOTP code");
            return Ok(false);
        }

        let current = time_step(at)?;
        let skew = u64::from(window.unwrap_or(self.skew_steps));
        let first = current.saturating_sub(skew);
        let last = current.saturating_add(skew);

        for counter in first..=last {
            let candidate = format_code(hotp(&key, counter)?);
            if bool::from(candidate.as_bytes().ct_eq(code.as_bytes())) {
                if counter != current {
                    let drift_steps = counter as i64 - current as i64;
                    debug!(drift_steps = drift_steps, "Accepted drifted TOTP code");
                }
                return Ok(true);
            }
        }

        debug!("TOTP code did not match");
        Ok(false)
    }

    /// `otpauth://` URI for enrolling `secret` in an authenticator app,
    /// usually rendered as a QR code.
    pub fn provisioning_uri(&self, secret: &str, account: &str) -> Result<String> {
        decode_secret(secret)?;

        let mut uri = Url::parse("otpauth://totp/")
            .map_err(|e| DaylogError::InvalidInput(e.to_string()))?;
        uri.path_segments_mut()
            .map_err(|_| DaylogError::InvalidInput("otpauth URI cannot hold a label".to_string()))?
            .pop_if_empty()
            .push(&format!("{}:{}", self.issuer, account));
        uri.query_pairs_mut()
            .append_pair("secret", secret)
            .append_pair("issuer", &self.issuer)
            .append_pair("algorithm", "SHA1")
            .append_pair("digits", &CODE_DIGITS.to_string())
            .append_pair("period", &STEP_SECS.to_string());

        Ok(uri.into())
    }
}

impl Default for TotpEngine {
    fn default() -> Self {
        Self::new(&TotpConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;
    use std::time::Duration;

    /// Base32 of the RFC 6238 SHA-1 test key "12345678901234567890".
    const RFC_SECRET: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_rfc6238_vectors() {
        // Last six digits of the RFC's eight-digit SHA-1 values
        let engine = TotpEngine::default();
        let vectors = [
            (59, "287082"),
            (1_111_111_109, "081804"),
            (1_111_111_111, "050471"),
            (1_234_567_890, "005924"),
            (2_000_000_000, "279037"),
            (20_000_000_000, "353130"),
        ];
        for (secs, expected) in vectors {
            assert_eq!(engine.generate_code(RFC_SECRET, Some(at(secs))).unwrap(), expected);
        }
    }

    #[test]
    fn test_rfc_secret_encoding() {
        assert_eq!(base32::encode(b"12345678901234567890"), RFC_SECRET);
    }

    #[test]
    fn test_time_step() {
        assert_eq!(time_step(at(0)).unwrap(), 0);
        assert_eq!(time_step(at(29)).unwrap(), 0);
        assert_eq!(time_step(at(30)).unwrap(), 1);
        assert_eq!(time_step(at(59)).unwrap(), 1);
        assert!(time_step(at(-1)).is_err());
    }

    #[test]
    fn test_generated_secret_shape() {
        let secret = generate_secret();
        assert_eq!(secret.len(), 32);
        assert!(!secret.contains('='));
        assert_eq!(base32::decode(&secret).unwrap().len(), SECRET_BYTES);
        assert_ne!(secret, generate_secret());
    }

    #[test]
    fn test_code_is_six_digits() {
        let engine = TotpEngine::default();
        for _ in 0..50 {
            let code = engine.generate_code(&generate_secret(), None).unwrap();
            assert_eq!(code.len(), 6);
            assert!(code.bytes().all(|b| b.is_ascii_digit()));
        }
    }

    #[test]
    fn test_fresh_code_validates() {
        let engine = TotpEngine::default();
        let secret = engine.generate_secret();
        let code = engine.generate_code(&secret, None).unwrap();
        assert!(engine.validate_code(&secret, &code, None).unwrap());
    }

    #[test]
    fn test_drift_tolerance() {
        let clock = Arc::new(ManualClock::new(at(1_111_111_109)));
        let engine = TotpEngine::with_clock(&TotpConfig::default(), clock.clone());
        let code = engine.generate_code(RFC_SECRET, None).unwrap();

        clock.advance(Duration::from_secs(25));
        assert!(engine.validate_code(RFC_SECRET, &code, None).unwrap());

        clock.set(at(1_111_111_109 + 95));
        assert!(!engine.validate_code(RFC_SECRET, &code, None).unwrap());
    }

    #[test]
    fn test_previous_step_accepted_but_not_two_back() {
        let engine = TotpEngine::default();
        let issued = at(1_234_567_890);
        let code = engine.generate_code(RFC_SECRET, Some(issued)).unwrap();

        let one_step_later = at(1_234_567_890 + 30);
        assert!(engine.validate_code_at(RFC_SECRET, &code, one_step_later, None).unwrap());

        let two_steps_later = at(1_234_567_890 + 60);
        assert!(!engine.validate_code_at(RFC_SECRET, &code, two_steps_later, None).unwrap());
        assert!(engine.validate_code_at(RFC_SECRET, &code, two_steps_later, Some(2)).unwrap());
        assert!(!engine.validate_code_at(RFC_SECRET, &code, one_step_later, Some(0)).unwrap());
    }

    #[test]
    fn test_malformed_codes_rejected() {
        let engine = TotpEngine::default();
        let now = at(59);
        for code in ["", "28708", "2870820", "28708a", "28 082"] {
            assert!(!engine.validate_code_at(RFC_SECRET, code, now, None).unwrap());
        }
        // Surrounding whitespace from copy-paste is tolerated
        assert!(engine.validate_code_at(RFC_SECRET, " 287082 ", now, None).unwrap());
    }

    #[test]
    fn test_corrupt_secret_is_an_error() {
        let engine = TotpEngine::default();
        assert!(matches!(
            engine.generate_code("not base32!", None),
            Err(DaylogError::InvalidInput(_))
        ));
        assert!(matches!(
            engine.validate_code("", "123456", None),
            Err(DaylogError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_provisioning_uri() {
        let engine = TotpEngine::default();
        let uri = engine.provisioning_uri(RFC_SECRET, "alice@example.com").unwrap();

        assert!(uri.starts_with("otpauth://totp/Daylog:alice@example.com?"));
        assert!(uri.contains(&format!("secret={}", RFC_SECRET)));
        assert!(uri.contains("issuer=Daylog"));
        assert!(uri.contains("algorithm=SHA1"));
        assert!(uri.contains("digits=6"));
        assert!(uri.contains("period=30"));

        assert!(engine.provisioning_uri("###", "alice").is_err());
    }
}
