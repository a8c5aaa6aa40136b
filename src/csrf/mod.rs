//! CSRF protection using the double-submit cookie pattern.
//!
//! A random token is stored in a cookie that same-origin page scripts can
//! read. State-changing requests must echo it back in the `x-csrf-token`
//! header or a `csrf-token` form field; a cross-origin page cannot read the
//! cookie and so cannot produce a matching value.

mod cookie;
mod token;

pub use cookie::{CookieJar, CookieOptions, CookieStore, SameSite};
pub use token::{generate_token, parse_form, CsrfGuard, CSRF_COOKIE_NAME, CSRF_HEADER_NAME};
