//! Configuration manager routes: `/private/config/*`
//!
//! Guide and login are reachable without a configuration login; the
//! config-access filter guards the rest.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};

use selfpass_core::setting::{SettingKey, SettingSyntax};
use selfpass_core::{EncodingMode, StoredConfiguration, factory, util};

use crate::error::AppError;
use crate::filters::config_access::{PERSISTENT_CONFIG_COOKIE, issue_persistent_login};
use crate::filters::{RequestContext, set_cookie};
use crate::routes::PasswordForm;
use crate::runtime::ApplicationMode;
use crate::session::CurrentSession;
use crate::state::AppState;

/// Build the `/private/config` router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/private/config/guide", get(guide).post(set_initial_password))
        .route("/private/config/login", post(login))
        .route("/private/config/logout", post(logout))
        .route("/private/config/settings", get(list_settings))
        .route(
            "/private/config/settings/{key}",
            get(read_setting).put(write_setting).delete(reset_setting),
        )
        .route("/private/config/export", get(export))
}

// ── Request / Response types ─────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct GuideResponse {
    pub mode: ApplicationMode,
    pub has_password: bool,
    pub locked: bool,
}

#[derive(Debug, Deserialize)]
pub struct ConfigLoginRequest {
    pub password: String,
    #[serde(default)]
    pub remember: bool,
}

#[derive(Debug, Serialize)]
pub struct ConfigLoginResponse {
    pub authenticated: bool,
    /// Seconds the persistent login cookie stays valid, when one was issued.
    pub persistent_seconds: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct SettingSummary {
    pub key: &'static str,
    pub label: &'static str,
    pub syntax: SettingSyntax,
    pub is_default: bool,
}

#[derive(Debug, Serialize)]
pub struct SettingsList {
    pub locked: bool,
    pub settings: Vec<SettingSummary>,
    /// Validation errors of written values, keyed by setting.
    pub errors: BTreeMap<String, Vec<String>>,
    /// Stored with an older syntax version and rewritten on next save.
    pub needing_update: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SettingView {
    pub key: &'static str,
    pub label: &'static str,
    pub syntax: SettingSyntax,
    pub is_default: bool,
    /// Value in JSON form with secrets redacted.
    pub value: serde_json::Value,
    pub display: String,
}

// ── Handlers ─────────────────────────────────────────────────────────

fn setting_key(key: &str) -> Result<SettingKey, AppError> {
    SettingKey::from_key(key).ok_or_else(|| AppError::NotFound(format!("unknown setting: {key}")))
}

fn setting_view(config: &StoredConfiguration, key: SettingKey) -> Result<SettingView, AppError> {
    let setting = key.setting();
    let value = config.read_setting(key)?;
    Ok(SettingView {
        key: setting.key,
        label: setting.label,
        syntax: setting.syntax,
        is_default: config.is_default(key)?,
        value: value.to_debug_json()?,
        display: value.to_debug_string(),
    })
}

async fn guide(State(state): State<Arc<AppState>>) -> Json<GuideResponse> {
    let mode = state.runtime().await.mode;
    let (has_password, locked) = state
        .read_config(|c| (c.has_config_password(), c.is_locked()))
        .await;
    Json(GuideResponse {
        mode,
        has_password,
        locked,
    })
}

/// Set the configuration password of a new installation.
async fn set_initial_password(
    State(state): State<Arc<AppState>>,
    Extension(CurrentSession(session)): Extension<CurrentSession>,
    Json(body): Json<PasswordForm>,
) -> Result<Json<GuideResponse>, AppError> {
    if util::is_blank(&body.password) {
        return Err(AppError::BadRequest("configuration password must not be blank".to_owned()));
    }
    if state.read_config(StoredConfiguration::has_config_password).await {
        return Err(AppError::Conflict("configuration password is already set".to_owned()));
    }

    state
        .update_config(|c| {
            c.set_config_password(&body.password);
            Ok(())
        })
        .await?;
    state
        .sessions
        .update(&session.id, |s| s.config_authenticated = true)
        .await;
    tracing::info!("initial configuration password set");

    Ok(guide(State(state)).await)
}

async fn login(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(CurrentSession(session)): Extension<CurrentSession>,
    Json(body): Json<ConfigLoginRequest>,
) -> Result<Response, AppError> {
    let runtime = state.runtime().await;
    let client = ctx.client_address;

    let verified = state
        .read_config(|c| c.verify_config_password(&body.password))
        .await;
    if !verified {
        let locked = state
            .intruder
            .mark_failed(&client, runtime.intruder_max_attempts, runtime.intruder_reset)
            .await;
        tracing::warn!(client = %client, locked, "configuration login failed");
        return Err(if locked {
            AppError::IntruderLockout
        } else {
            AppError::Unauthorized("invalid configuration password".to_owned())
        });
    }

    state.intruder.clear(&client).await;
    state
        .sessions
        .update(&session.id, |s| s.config_authenticated = true)
        .await;
    tracing::info!(client = %client, "configuration login succeeded");

    let lifetime = runtime.persistent_login;
    let cookie = if body.remember && lifetime.as_seconds() > 0 {
        Some(
            state
                .read_config(|c| {
                    issue_persistent_login(c.security_key(), &runtime.config_hash, lifetime)
                })
                .await?,
        )
    } else {
        None
    };

    let persistent_seconds = cookie.as_ref().map(|_| lifetime.as_seconds());
    let mut response = Json(ConfigLoginResponse {
        authenticated: true,
        persistent_seconds,
    })
    .into_response();
    if let Some(cookie) = cookie {
        set_cookie(&mut response, PERSISTENT_CONFIG_COOKIE, &cookie, persistent_seconds);
    }
    Ok(response)
}

async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(CurrentSession(session)): Extension<CurrentSession>,
) -> Response {
    state
        .sessions
        .update(&session.id, |s| s.config_authenticated = false)
        .await;
    let mut response = StatusCode::NO_CONTENT.into_response();
    set_cookie(&mut response, PERSISTENT_CONFIG_COOKIE, "", Some(0));
    response
}

async fn list_settings(State(state): State<Arc<AppState>>) -> Result<Json<SettingsList>, AppError> {
    state
        .read_config(|c| {
            let settings = SettingKey::ALL
                .into_iter()
                .map(|key| {
                    let setting = key.setting();
                    Ok(SettingSummary {
                        key: setting.key,
                        label: setting.label,
                        syntax: setting.syntax,
                        is_default: c.is_default(key)?,
                    })
                })
                .collect::<Result<Vec<_>, AppError>>()?;
            Ok(Json(SettingsList {
                locked: c.is_locked(),
                settings,
                errors: c.validate_all(),
                needing_update: c.settings_needing_update(),
            }))
        })
        .await
}

async fn read_setting(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<SettingView>, AppError> {
    let key = setting_key(&key)?;
    state.read_config(|c| setting_view(c, key)).await.map(Json)
}

/// Replace a setting with a value given in its JSON form.
async fn write_setting(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<SettingView>, AppError> {
    let key = setting_key(&key)?;
    let value = factory::from_json(key.setting(), &body)?;
    state.update_config(|c| c.write_setting(key, value)).await?;
    state.read_config(|c| setting_view(c, key)).await.map(Json)
}

async fn reset_setting(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<SettingView>, AppError> {
    let key = setting_key(&key)?;
    state.update_config(|c| c.reset_setting(key)).await?;
    state.read_config(|c| setting_view(c, key)).await.map(Json)
}

/// The configuration document with every secret stripped.
async fn export(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let xml = state
        .read_config(|c| c.to_xml(EncodingMode::Stripped))
        .await?;
    Ok(([(CONTENT_TYPE, "application/xml; charset=utf-8")], xml).into_response())
}
