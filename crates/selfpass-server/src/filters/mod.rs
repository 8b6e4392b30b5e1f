//! The request filter chain.
//!
//! Each filter is an axum middleware function. They run in this order:
//!
//! 1. [`request_init`]: request id, URI length, locale, theme, security headers
//! 2. [`application_mode`]: gate requests on the configuration lifecycle
//! 3. [`session`]: session cookie, idle timeout, verification round trip
//! 4. [`authentication`]: user login strategies and post-login checks
//! 5. [`config_access`]: configuration-manager login and intruder lockout

pub mod application_mode;
pub mod authentication;
pub mod config_access;
pub mod request_init;
pub mod session;

use axum::http::header::{COOKIE, LOCATION, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};

pub const HEALTH_PATH: &str = "/public/health";
pub const LOGIN_PATH: &str = "/public/login";
pub const CONFIG_PREFIX: &str = "/private/config";
pub const CONFIG_GUIDE_PATH: &str = "/private/config/guide";
pub const CONFIG_LOGIN_PATH: &str = "/private/config/login";

/// Per-request values resolved by [`request_init`].
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub locale: String,
    pub theme: String,
    /// Nonce substituted into the CSP header.
    pub nonce: String,
    pub client_address: String,
}

/// `true` for `/private/config` and anything below it.
pub fn is_config_path(path: &str) -> bool {
    path == CONFIG_PREFIX || path.starts_with("/private/config/")
}

/// `true` for `/private` and anything below it.
pub fn is_private_path(path: &str) -> bool {
    path == "/private" || path.starts_with("/private/")
}

/// A `303 See Other` to `location`.
pub fn redirect(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::SEE_OTHER, [(LOCATION, value)]).into_response(),
        Err(_) => crate::error::AppError::BadRequest("invalid redirect location".to_owned())
            .into_response(),
    }
}

/// Value of cookie `name` from the request's `Cookie` headers.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim().to_owned())
}

/// Append a `Set-Cookie` header. `max_age` of `Some(0)` deletes the cookie;
/// `None` makes it a browser-session cookie.
pub fn set_cookie(response: &mut Response, name: &str, value: &str, max_age: Option<u64>) {
    let mut cookie = format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax");
    if let Some(age) = max_age {
        cookie.push_str(&format!("; Max-Age={age}"));
    }
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            response.headers_mut().append(SET_COOKIE, value);
        }
        Err(e) => tracing::warn!(cookie = name, error = %e, "cookie value is not a valid header"),
    }
}

/// Value of query parameter `name`, percent-decoded.
pub fn query_param(uri: &Uri, name: &str) -> Option<String> {
    uri.query()?
        .split('&')
        .filter_map(|pair| pair.split_once('=').or(Some((pair, ""))))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| {
            urlencoding::decode(v).map_or_else(|_| v.to_owned(), std::borrow::Cow::into_owned)
        })
}

/// Path and query of `uri` with parameter `name` removed.
pub fn without_query_param(uri: &Uri, name: &str) -> String {
    let kept: Vec<&str> = uri
        .query()
        .unwrap_or_default()
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| pair.split('=').next() != Some(name))
        .collect();
    if kept.is_empty() {
        uri.path().to_owned()
    } else {
        format!("{}?{}", uri.path(), kept.join("&"))
    }
}

/// Path and query of `uri` with parameter `name` set to `value`.
pub fn with_query_param(uri: &Uri, name: &str, value: &str) -> String {
    let base = without_query_param(uri, name);
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}{name}={}", urlencoding::encode(value))
}

/// Path and query of `uri`, for use as a return address.
pub fn path_and_query(uri: &Uri) -> String {
    uri.path_and_query()
        .map_or_else(|| uri.path().to_owned(), |pq| pq.as_str().to_owned())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn cookie_lookup_across_headers() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("theme=dark; SELFPASSID=abc"));
        headers.append(COOKIE, HeaderValue::from_static("locale=fr"));
        assert_eq!(read_cookie(&headers, "SELFPASSID").as_deref(), Some("abc"));
        assert_eq!(read_cookie(&headers, "locale").as_deref(), Some("fr"));
        assert_eq!(read_cookie(&headers, "missing"), None);
    }

    #[test]
    fn query_param_editing() {
        let uri: Uri = "/private/?a=1&verifySession=xyz&b=two%20words".parse().unwrap();
        assert_eq!(query_param(&uri, "verifySession").as_deref(), Some("xyz"));
        assert_eq!(query_param(&uri, "b").as_deref(), Some("two words"));
        assert_eq!(without_query_param(&uri, "verifySession"), "/private/?a=1&b=two%20words");

        let bare: Uri = "/private/".parse().unwrap();
        assert_eq!(with_query_param(&bare, "verifySession", "t"), "/private/?verifySession=t");
        assert_eq!(
            with_query_param(&uri, "verifySession", "new"),
            "/private/?a=1&b=two%20words&verifySession=new"
        );
    }

    #[test]
    fn path_classification() {
        assert!(is_config_path("/private/config"));
        assert!(is_config_path("/private/config/settings"));
        assert!(!is_config_path("/private/configuration"));
        assert!(is_private_path("/private/"));
        assert!(!is_private_path("/public/login"));
    }

    #[test]
    fn redirect_is_see_other() {
        let response = redirect("/public/login?next=%2Fprivate%2F");
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[LOCATION], "/public/login?next=%2Fprivate%2F");
    }
}
