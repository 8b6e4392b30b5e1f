//! Public routes: `/public/*`
//!
//! Health check, user login, and logout. No authentication required.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::filters::{RequestContext, set_cookie};
use crate::routes::safe_next;
use crate::runtime::{ApplicationMode, AuthMethod};
use crate::session::{CurrentSession, SESSION_COOKIE};
use crate::state::AppState;

/// Build the `/public` router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/public/health", get(health))
        .route("/public/login", get(login_page).post(login))
        .route("/public/logout", get(logout).post(logout))
}

// ── Request / Response types ─────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub mode: ApplicationMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginPage {
    pub title: String,
    pub locale: String,
    pub auth_methods: Vec<AuthMethod>,
    pub next: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub next: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub username: String,
    pub redirect: String,
}

// ── Handlers ─────────────────────────────────────────────────────────

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let mode = state.runtime().await.mode;
    Json(HealthResponse {
        status: if mode == ApplicationMode::Error { "error" } else { "ok" },
        mode,
        error: state.load_error.clone(),
    })
}

async fn login_page(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<NextQuery>,
) -> Json<LoginPage> {
    let runtime = state.runtime().await;
    Json(LoginPage {
        title: runtime.title(&ctx.locale),
        locale: ctx.locale,
        auth_methods: runtime.auth_methods.clone(),
        next: safe_next(query.next.as_deref(), "/private/"),
    })
}

/// Check credentials against the user directory and bind the user to the session.
async fn login(
    State(state): State<Arc<AppState>>,
    Extension(CurrentSession(session)): Extension<CurrentSession>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let Some(account) = state
        .directory
        .authenticate(&body.username, &body.password)
        .await?
    else {
        tracing::info!(username = %body.username, "login failed");
        return Err(AppError::Unauthorized("invalid username or password".to_owned()));
    };

    tracing::info!(username = %account.username, "user logged in");
    let username = account.username.clone();
    state
        .sessions
        .update(&session.id, move |s| s.user = Some(account))
        .await;

    Ok(Json(LoginResponse {
        username,
        redirect: safe_next(body.next.as_deref(), "/private/"),
    }))
}

async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(CurrentSession(session)): Extension<CurrentSession>,
) -> Response {
    state.sessions.remove(&session.id).await;
    tracing::info!("session ended by logout");
    let mut response = Json(serde_json::json!({ "logged_out": true })).into_response();
    set_cookie(&mut response, SESSION_COOKIE, "", Some(0));
    response
}
