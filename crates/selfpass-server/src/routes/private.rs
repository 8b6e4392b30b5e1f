//! Authenticated user routes: `/private/*`
//!
//! The landing summary and the pages that complete post-login workflows.

use std::sync::Arc;

use axum::extract::State;
use axum::http::Uri;
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde::Serialize;

use selfpass_core::converter::localized;
use selfpass_core::util;

use crate::directory::{UserAccount, Workflow};
use crate::error::AppError;
use crate::filters::RequestContext;
use crate::filters::authentication::{AuthenticatedUser, required_workflow, workflow_path};
use crate::routes::PasswordForm;
use crate::session::CurrentSession;
use crate::state::AppState;

/// Build the `/private` router.
pub fn router() -> Router<Arc<AppState>> {
    let mut router = Router::new()
        .route("/private", get(summary))
        .route("/private/", get(summary));
    for workflow in Workflow::ALL {
        let route = match workflow {
            Workflow::ChangePassword | Workflow::ExpiredPassword => {
                get(workflow_page).post(change_password)
            }
            Workflow::SetupResponses | Workflow::SetupOtp | Workflow::UpdateProfile => {
                get(workflow_page).post(complete_workflow)
            }
        };
        router = router.route(workflow_path(workflow), route);
    }
    router
}

// ── Response types ───────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct LinkView {
    pub name: String,
    pub label: String,
    pub description: String,
    pub url: String,
    pub new_window: bool,
}

#[derive(Debug, Serialize)]
pub struct Summary {
    pub title: String,
    pub username: String,
    pub display_name: String,
    pub links: Vec<LinkView>,
    pub pending: Option<Workflow>,
}

#[derive(Debug, Serialize)]
pub struct WorkflowPage {
    pub workflow: Workflow,
    pub required: bool,
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct WorkflowDone {
    pub workflow: Workflow,
    pub redirect: String,
}

// ── Handlers ─────────────────────────────────────────────────────────

fn workflow_for_path(path: &str) -> Result<Workflow, AppError> {
    Workflow::ALL
        .into_iter()
        .find(|w| workflow_path(*w) == path)
        .ok_or_else(|| AppError::NotFound(format!("no workflow at {path}")))
}

async fn summary(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
) -> Json<Summary> {
    let runtime = state.runtime().await;
    let links = runtime
        .custom_links
        .iter()
        .map(|link| LinkView {
            name: link.name.clone(),
            label: localized(&link.labels, &ctx.locale)
                .cloned()
                .unwrap_or_else(|| link.name.clone()),
            description: localized(&link.description, &ctx.locale)
                .cloned()
                .unwrap_or_default(),
            url: link.custom_link_url.clone(),
            new_window: link.custom_link_new_window,
        })
        .collect();

    Json(Summary {
        title: runtime.title(&ctx.locale),
        pending: required_workflow(&runtime, &user),
        username: user.username,
        display_name: user.display_name,
        links,
    })
}

async fn workflow_page(
    State(state): State<Arc<AppState>>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    uri: Uri,
) -> Result<Json<WorkflowPage>, AppError> {
    let workflow = workflow_for_path(uri.path())?;
    let runtime = state.runtime().await;
    Ok(Json(WorkflowPage {
        workflow,
        required: required_workflow(&runtime, &user) == Some(workflow),
        username: user.username,
    }))
}

/// Reload the account after a directory change so the session sees the new flags.
async fn refresh_session_user(
    state: &AppState,
    session_id: &str,
    username: &str,
) -> Result<UserAccount, AppError> {
    let account = state
        .directory
        .lookup(username)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("unknown user '{username}'")))?;
    let stored = account.clone();
    state
        .sessions
        .update(session_id, move |s| s.user = Some(stored))
        .await;
    Ok(account)
}

async fn next_page(state: &AppState, user: &UserAccount) -> String {
    let runtime = state.runtime().await;
    required_workflow(&runtime, user).map_or_else(|| "/private/".to_owned(), |w| workflow_path(w).to_owned())
}

async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(CurrentSession(session)): Extension<CurrentSession>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    uri: Uri,
    Json(body): Json<PasswordForm>,
) -> Result<Json<WorkflowDone>, AppError> {
    let workflow = workflow_for_path(uri.path())?;
    if util::is_blank(&body.password) {
        return Err(AppError::BadRequest("new password must not be blank".to_owned()));
    }

    state.directory.set_password(&user.username, &body.password).await?;
    tracing::info!(username = %user.username, ?workflow, "password changed");

    let account = refresh_session_user(&state, &session.id, &user.username).await?;
    Ok(Json(WorkflowDone {
        workflow,
        redirect: next_page(&state, &account).await,
    }))
}

async fn complete_workflow(
    State(state): State<Arc<AppState>>,
    Extension(CurrentSession(session)): Extension<CurrentSession>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    uri: Uri,
) -> Result<Json<WorkflowDone>, AppError> {
    let workflow = workflow_for_path(uri.path())?;
    state.directory.complete_workflow(&user.username, workflow).await?;
    tracing::info!(username = %user.username, ?workflow, "workflow completed");

    let account = refresh_session_user(&state, &session.id, &user.username).await?;
    Ok(Json(WorkflowDone {
        workflow,
        redirect: next_page(&state, &account).await,
    }))
}
