//! Request-scoped cookie access.

use http::header::{COOKIE, SET_COOKIE};
use http::{HeaderMap, HeaderValue};
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

/// `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// Attributes attached to a cookie when it is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieOptions {
    pub path: String,
    pub http_only: bool,
    pub same_site: SameSite,
    pub secure: bool,
    pub max_age: Option<Duration>,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            http_only: true,
            same_site: SameSite::Lax,
            secure: true,
            max_age: None,
        }
    }
}

impl CookieOptions {
    /// Render a `Set-Cookie` header value for `name=value` with these attributes.
    pub fn to_set_cookie(&self, name: &str, value: &str) -> String {
        let mut header = format!("{}={}; Path={}", name, value, self.path);
        if let Some(max_age) = self.max_age {
            header.push_str(&format!("; Max-Age={}", max_age.as_secs()));
        }
        if self.http_only {
            header.push_str("; HttpOnly");
        }
        header.push_str("; SameSite=");
        header.push_str(self.same_site.as_str());
        if self.secure {
            header.push_str("; Secure");
        }
        header
    }
}

/// Read/write access to the cookies of the request being handled.
pub trait CookieStore {
    /// Get a cookie value by name.
    fn get(&self, name: &str) -> Option<String>;

    /// Write a cookie to be sent back with the response.
    fn set(&mut self, name: &str, value: &str, options: &CookieOptions);
}

/// Cookie store backed by the request's `Cookie` header.
///
/// Cookies written during the request shadow the inbound ones and are
/// emitted as `Set-Cookie` headers by [`CookieJar::write_to`].
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    inbound: HashMap<String, String>,
    outbound: Vec<(String, String, CookieOptions)>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a jar from the `Cookie` headers of a request.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut inbound = HashMap::new();
        for value in headers.get_all(COOKIE) {
            let Ok(value) = value.to_str() else { continue };
            for pair in value.split(';') {
                if let Some((name, value)) = pair.split_once('=') {
                    let name = name.trim();
                    if !name.is_empty() {
                        inbound
                            .entry(name.to_string())
                            .or_insert_with(|| value.trim().trim_matches('"').to_string());
                    }
                }
            }
        }
        Self {
            inbound,
            outbound: Vec::new(),
        }
    }

    /// Cookies written during this request, in order.
    pub fn pending(&self) -> impl Iterator<Item = (&str, &str, &CookieOptions)> {
        self.outbound
            .iter()
            .map(|(name, value, options)| (name.as_str(), value.as_str(), options))
    }

    /// Append a `Set-Cookie` header per written cookie.
    pub fn write_to(&self, headers: &mut HeaderMap) {
        for (name, value, options) in self.pending() {
            match HeaderValue::from_str(&options.to_set_cookie(name, value)) {
                Ok(header) => {
                    headers.append(SET_COOKIE, header);
                }
                Err(_) => warn!(cookie = %name, "Skipping cookie with invalid header characters"),
            }
        }
    }
}

impl CookieStore for CookieJar {
    fn get(&self, name: &str) -> Option<String> {
        self.outbound
            .iter()
            .rev()
            .find(|(pending, _, _)| pending == name)
            .map(|(_, value, _)| value.clone())
            .or_else(|| self.inbound.get(name).cloned())
    }

    fn set(&mut self, name: &str, value: &str, options: &CookieOptions) {
        self.outbound
            .push((name.to_string(), value.to_string(), options.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_cookie_rendering() {
        let options = CookieOptions {
            path: "/".to_string(),
            http_only: false,
            same_site: SameSite::Strict,
            secure: true,
            max_age: Some(Duration::from_secs(86400)),
        };
        assert_eq!(
            options.to_set_cookie("csrf-token", "abc"),
            "csrf-token=abc; Path=/; Max-Age=86400; SameSite=Strict; Secure"
        );
    }

    #[test]
    fn test_jar_parses_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("session=xyz; csrf-token=abc; empty="));

        let jar = CookieJar::from_headers(&headers);
        assert_eq!(jar.get("csrf-token").as_deref(), Some("abc"));
        assert_eq!(jar.get("session").as_deref(), Some("xyz"));
        assert_eq!(jar.get("empty").as_deref(), Some(""));
        assert_eq!(jar.get("missing"), None);
    }

    #[test]
    fn test_written_cookie_shadows_inbound() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("csrf-token=old"));

        let mut jar = CookieJar::from_headers(&headers);
        jar.set("csrf-token", "new", &CookieOptions::default());
        assert_eq!(jar.get("csrf-token").as_deref(), Some("new"));

        let mut response = HeaderMap::new();
        jar.write_to(&mut response);
        let set_cookie = response.get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(set_cookie.starts_with("csrf-token=new; Path=/"));
        assert!(set_cookie.contains("HttpOnly"));
    }
}
