//! Gates requests on the application's configuration lifecycle.
//!
//! In `NEW` mode only the health check and the configuration manager are
//! reachable; everything else is sent to the configuration guide. In
//! `ERROR` mode every request but the health check gets a 503.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::{CONFIG_GUIDE_PATH, HEALTH_PATH, is_config_path, redirect};
use crate::error::AppError;
use crate::runtime::ApplicationMode;
use crate::state::AppState;

pub async fn application_mode(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path();
    if path == HEALTH_PATH {
        return next.run(req).await;
    }

    match state.runtime().await.mode {
        ApplicationMode::Error => {
            let reason = state
                .load_error
                .clone()
                .unwrap_or_else(|| "configuration is unavailable".to_owned());
            AppError::ApplicationUnavailable(reason).into_response()
        }
        ApplicationMode::New if !is_config_path(path) => {
            tracing::debug!(path, "application not configured, redirecting to guide");
            redirect(CONFIG_GUIDE_PATH)
        }
        ApplicationMode::New | ApplicationMode::Configuration | ApplicationMode::Running => {
            next.run(req).await
        }
    }
}
