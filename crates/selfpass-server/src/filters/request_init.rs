//! First filter: request bookkeeping and security headers.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::{ACCEPT_LANGUAGE, CONTENT_SECURITY_POLICY, X_FRAME_OPTIONS};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use selfpass_core::util;

use super::{RequestContext, read_cookie};
use crate::error::AppError;
use crate::intruder::client_address;
use crate::state::AppState;

/// Longest request URI accepted, in bytes.
pub const MAX_URI_LENGTH: usize = 8192;

pub const LOCALE_COOKIE: &str = "locale";
pub const THEME_COOKIE: &str = "theme";
pub const DEFAULT_LOCALE: &str = "en";
pub const DEFAULT_THEME: &str = "default";

const X_REQUEST_ID: &str = "x-request-id";

/// First language tag of an `Accept-Language` header, ignoring wildcards.
fn preferred_language(header: &str) -> Option<String> {
    header
        .split(',')
        .filter_map(|part| part.split(';').next())
        .map(str::trim)
        .find(|tag| !tag.is_empty() && *tag != "*")
        .map(|tag| tag.replace('-', "_"))
}

fn resolve_locale(req: &Request) -> String {
    read_cookie(req.headers(), LOCALE_COOKIE)
        .filter(|v| !v.is_empty())
        .or_else(|| {
            req.headers()
                .get(ACCEPT_LANGUAGE)
                .and_then(|v| v.to_str().ok())
                .and_then(preferred_language)
        })
        .unwrap_or_else(|| DEFAULT_LOCALE.to_owned())
}

pub async fn request_init(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let uri_length = req.uri().to_string().len();
    if uri_length > MAX_URI_LENGTH {
        tracing::warn!(uri_length, "request uri exceeds maximum length");
        return AppError::UriTooLong.into_response();
    }

    let ctx = RequestContext {
        request_id: uuid::Uuid::new_v4().to_string(),
        locale: resolve_locale(&req),
        theme: read_cookie(req.headers(), THEME_COOKIE)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_THEME.to_owned()),
        nonce: util::random_token(),
        client_address: client_address(req.extensions()),
    };
    let request_id = ctx.request_id.clone();
    let nonce = ctx.nonce.clone();
    req.extensions_mut().insert(ctx);

    let runtime = state.runtime().await;
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    if !runtime.csp_header.is_empty() {
        let policy = runtime.csp_header.replace("%NONCE%", &nonce);
        match HeaderValue::from_str(&policy) {
            Ok(value) => {
                headers.insert(CONTENT_SECURITY_POLICY, value);
            }
            Err(e) => tracing::warn!(error = %e, "configured CSP header is not a valid header value"),
        }
    }
    if runtime.prevent_framing {
        headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    }
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        headers.insert(X_REQUEST_ID, value);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_language_picks_first_tag() {
        assert_eq!(preferred_language("fr-CA,fr;q=0.9,en;q=0.8").as_deref(), Some("fr_CA"));
        assert_eq!(preferred_language("*, de").as_deref(), Some("de"));
        assert_eq!(preferred_language(""), None);
    }
}
