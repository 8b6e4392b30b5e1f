//! Guards the configuration manager.
//!
//! Pages under `/private/config/` other than the guide and the login page
//! require a session that has passed the configuration login, or a
//! persistent-login cookie. The cookie holds an `ENCODED` token with its
//! expiry and the configuration hash at login, so any change to the
//! configuration invalidates it. Clients locked out by the intruder tracker
//! are refused before anything else.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use selfpass_core::encoder;
use selfpass_core::time::TimeDuration;
use selfpass_core::{EncodingMode, SecurityKey};

use super::{CONFIG_GUIDE_PATH, CONFIG_LOGIN_PATH, RequestContext, is_config_path, read_cookie};
use crate::error::AppError;
use crate::session::CurrentSession;
use crate::state::AppState;

pub const PERSISTENT_CONFIG_COOKIE: &str = "COOKIE_PERSISTENT_CONFIG_LOGIN";

#[derive(Debug, Serialize, Deserialize)]
struct PersistentLogin {
    expires: DateTime<Utc>,
    hash: String,
}

/// Build a persistent-login cookie value valid for `lifetime`, bound to the
/// configuration whose hash is `config_hash`.
///
/// # Errors
///
/// Returns [`AppError::Internal`] if the token cannot be encoded.
pub fn issue_persistent_login(
    key: &SecurityKey,
    config_hash: &str,
    lifetime: TimeDuration,
) -> Result<String, AppError> {
    let token = PersistentLogin {
        expires: lifetime.after(Utc::now()),
        hash: config_hash.to_owned(),
    };
    let json = serde_json::to_string(&token).map_err(|e| AppError::Internal(e.to_string()))?;
    let encoded = encoder::encode(&json, EncodingMode::Encoded, key)
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(urlencoding::encode(&encoded).into_owned())
}

/// `true` when `cookie` was sealed with `key` for the configuration hashing
/// to `config_hash` and has not expired.
///
/// Only `ENCODED` tokens are accepted; any other prefix could be minted
/// without the key.
pub fn verify_persistent_login(key: &SecurityKey, config_hash: &str, cookie: &str) -> bool {
    let Ok(encoded) = urlencoding::decode(cookie) else {
        return false;
    };
    if !matches!(EncodingMode::detect(&encoded), Some((EncodingMode::Encoded, _))) {
        tracing::warn!("persistent config login cookie is not sealed, rejecting");
        return false;
    }
    let token = encoder::decode(&encoded, EncodingMode::Encoded, key)
        .ok()
        .and_then(|json| serde_json::from_str::<PersistentLogin>(&json).ok());
    let Some(token) = token else {
        tracing::debug!("persistent config login cookie did not decode");
        return false;
    };
    token.expires > Utc::now() && token.hash == config_hash
}

pub async fn config_access(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path();
    if !is_config_path(path) {
        return next.run(req).await;
    }

    let client = req
        .extensions()
        .get::<RequestContext>()
        .map_or_else(|| "unknown".to_owned(), |ctx| ctx.client_address.clone());
    if state.intruder.is_locked(&client).await {
        tracing::warn!(client = %client, "configuration access refused, client locked out");
        return AppError::IntruderLockout.into_response();
    }

    if path == CONFIG_GUIDE_PATH || path == CONFIG_LOGIN_PATH {
        return next.run(req).await;
    }

    let Some(CurrentSession(session)) = req.extensions().get::<CurrentSession>().cloned() else {
        return AppError::Internal("session filter did not run".to_owned()).into_response();
    };
    if session.config_authenticated {
        return next.run(req).await;
    }

    if let Some(cookie) = read_cookie(req.headers(), PERSISTENT_CONFIG_COOKIE) {
        let runtime = state.runtime().await;
        let valid = state
            .read_config(|config| {
                verify_persistent_login(config.security_key(), &runtime.config_hash, &cookie)
            })
            .await;
        if valid {
            state
                .sessions
                .update(&session.id, |s| s.config_authenticated = true)
                .await;
            tracing::info!(client = %client, "configuration login restored from persistent cookie");
            return next.run(req).await;
        }
    }

    AppError::Unauthorized("configuration login required".to_owned()).into_response()
}
