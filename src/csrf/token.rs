//! Double-submit CSRF tokens.

use http::HeaderMap;
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashMap;
use std::time::Duration;
use subtle::ConstantTimeEq;
use tracing::debug;

use super::cookie::{CookieOptions, CookieStore, SameSite};
use crate::config::CsrfConfig;

/// Name of the cookie holding the token. Form submissions carry the token
/// in a field of the same name.
pub const CSRF_COOKIE_NAME: &str = "csrf-token";
/// Request header clients echo the token back in.
pub const CSRF_HEADER_NAME: &str = "x-csrf-token";
/// Random bytes per token; hex encoding doubles the length.
const TOKEN_BYTES: usize = 32;

/// Generate a fresh token: 32 bytes from the OS random source, lowercase hex.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Decode an `application/x-www-form-urlencoded` body.
///
/// Later duplicates of a field are ignored.
pub fn parse_form(body: &[u8]) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    for (name, value) in url::form_urlencoded::parse(body) {
        fields.entry(name.into_owned()).or_insert_with(|| value.into_owned());
    }
    fields
}

/// Issues the CSRF cookie and checks echoed tokens against it.
///
/// The cookie is deliberately readable by page scripts (`HttpOnly` off) so
/// they can copy it into the `x-csrf-token` header.
#[derive(Debug, Clone)]
pub struct CsrfGuard {
    secure: bool,
    max_age: Duration,
}

impl CsrfGuard {
    pub fn new(config: &CsrfConfig) -> Self {
        Self {
            secure: config.secure_cookies,
            max_age: Duration::from_secs(config.max_age_secs),
        }
    }

    /// Attributes the token cookie is written with.
    pub fn cookie_options(&self) -> CookieOptions {
        CookieOptions {
            path: "/".to_string(),
            http_only: false,
            same_site: SameSite::Strict,
            secure: self.secure,
            max_age: Some(self.max_age),
        }
    }

    /// Store `token` in the CSRF cookie.
    pub fn set_token<C: CookieStore + ?Sized>(&self, cookies: &mut C, token: &str) {
        cookies.set(CSRF_COOKIE_NAME, token, &self.cookie_options());
    }

    /// Get the token from the CSRF cookie, if one is set.
    pub fn get_token<C: CookieStore + ?Sized>(&self, cookies: &C) -> Option<String> {
        cookies.get(CSRF_COOKIE_NAME).filter(|token| !token.is_empty())
    }

    /// Return the session's token, generating and storing one if missing.
    pub fn ensure_token<C: CookieStore + ?Sized>(&self, cookies: &mut C) -> String {
        if let Some(token) = self.get_token(cookies) {
            return token;
        }
        let token = generate_token();
        self.set_token(cookies, &token);
        debug!("Issued new CSRF token");
        token
    }

    /// Check the token echoed by a request against the cookie.
    ///
    /// The candidate is taken from the `x-csrf-token` header, or failing
    /// that from the `csrf-token` form field. Any missing or empty value, or
    /// a mismatch, yields `false`.
    pub fn validate_token<C: CookieStore + ?Sized>(
        &self,
        cookies: &C,
        headers: &HeaderMap,
        form: Option<&HashMap<String, String>>,
    ) -> bool {
        let Some(expected) = self.get_token(cookies) else {
            debug!("CSRF check failed: no token cookie");
            return false;
        };

        let from_header = headers
            .get(CSRF_HEADER_NAME)
            .and_then(|value| value.to_str().ok())
            .filter(|token| !token.is_empty())
            .map(str::to_string);
        let candidate = from_header
            .or_else(|| form.and_then(|fields| fields.get(CSRF_COOKIE_NAME).cloned()))
            .filter(|token| !token.is_empty());

        let Some(candidate) = candidate else {
            debug!("CSRF check failed: no token in request");
            return false;
        };

        let matches: bool = expected.as_bytes().ct_eq(candidate.as_bytes()).into();
        if !matches {
            debug!("CSRF check failed: token mismatch");
        }
        matches
    }
}

impl Default for CsrfGuard {
    fn default() -> Self {
        Self::new(&CsrfConfig::default())
    }
}
