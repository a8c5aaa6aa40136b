//! Client identification and limiter key derivation.

use http::HeaderMap;

/// Proxy chain header; the left-most entry is the original client.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
/// Set by a single reverse proxy in front of the app.
pub const REAL_IP_HEADER: &str = "x-real-ip";
/// Set by Cloudflare.
pub const CDN_CLIENT_IP_HEADER: &str = "cf-connecting-ip";
/// Identity shared by every client that carries none of the headers above.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Determine the originating client address of a request.
///
/// Headers are consulted in order: `x-forwarded-for` (first entry only),
/// `x-real-ip`, `cf-connecting-ip`. Blank or non-UTF-8 values are skipped.
/// Clients that cannot be identified all map to [`UNKNOWN_CLIENT`].
pub fn client_ip(headers: &HeaderMap) -> String {
    let forwarded = header_str(headers, FORWARDED_FOR_HEADER)
        .and_then(|chain| chain.split(',').next())
        .map(str::trim);

    forwarded
        .filter(|ip| !ip.is_empty())
        .or_else(|| non_blank(headers, REAL_IP_HEADER))
        .or_else(|| non_blank(headers, CDN_CLIENT_IP_HEADER))
        .unwrap_or(UNKNOWN_CLIENT)
        .to_string()
}

/// Build the limiter key for a client and route.
///
/// Routes are tracked independently, so the same client hitting two
/// different paths consumes two separate budgets.
pub fn limiter_key(client: &str, route: &str) -> String {
    format!("{}:{}", client, route)
}

/// Limiter key for a request: client address combined with the route path.
pub fn request_key(headers: &HeaderMap, route: &str) -> String {
    limiter_key(&client_ip(headers), route)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn non_blank<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    header_str(headers, name)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}
