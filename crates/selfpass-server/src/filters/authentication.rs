//! Authentication filter for `/private/*` outside the configuration manager.
//!
//! An unauthenticated request tries the configured strategies in order;
//! the first one that identifies the user stores the account in the
//! session. An authenticated request then passes the post-login checks,
//! which send the user to any workflow they are required to complete.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use selfpass_core::util;

use super::{LOGIN_PATH, is_config_path, is_private_path, path_and_query, redirect};
use crate::directory::{UserAccount, Workflow};
use crate::error::AppError;
use crate::runtime::{AuthMethod, RuntimeSettings};
use crate::session::CurrentSession;
use crate::state::AppState;

/// The authenticated user, placed in request extensions.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub UserAccount);

/// Page that completes a workflow.
#[must_use]
pub fn workflow_path(workflow: Workflow) -> &'static str {
    match workflow {
        Workflow::ChangePassword => "/private/change-password",
        Workflow::SetupResponses => "/private/setup-responses",
        Workflow::SetupOtp => "/private/setup-otp",
        Workflow::UpdateProfile => "/private/update-profile",
        Workflow::ExpiredPassword => "/private/password-expired",
    }
}

enum Strategy {
    Authenticated(UserAccount),
    Redirect(String),
    /// The strategy does not apply to this request.
    Skip,
}

fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let header = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = String::from_utf8(util::base64_decode(encoded.trim()).ok()?).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_owned(), password.to_owned()))
}

/// Append the current URL as a return parameter to an external login URL.
fn external_login(base: &str, param: &str, return_to: &str) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}{param}={}", urlencoding::encode(return_to))
}

async fn try_strategy(
    method: AuthMethod,
    state: &AppState,
    runtime: &RuntimeSettings,
    headers: &HeaderMap,
    return_to: &str,
) -> Result<Strategy, AppError> {
    match method {
        AuthMethod::BasicAuth => {
            if !runtime.basic_auth_enabled {
                return Ok(Strategy::Skip);
            }
            let Some((username, password)) = basic_credentials(headers) else {
                return Ok(Strategy::Skip);
            };
            match state.directory.authenticate(&username, &password).await? {
                Some(account) => Ok(Strategy::Authenticated(account)),
                None => {
                    tracing::info!(username = %username, "basic authentication failed");
                    Err(AppError::Unauthorized("invalid username or password".to_owned()))
                }
            }
        }
        AuthMethod::SsoHeader => {
            let Some(header) = runtime.sso_header.as_deref() else {
                return Ok(Strategy::Skip);
            };
            let Some(username) = headers
                .get(header.to_ascii_lowercase().as_str())
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
            else {
                return Ok(Strategy::Skip);
            };
            match state.directory.lookup(username).await? {
                Some(account) => Ok(Strategy::Authenticated(account)),
                None => {
                    tracing::warn!(username, header, "sso header names an unknown user");
                    Err(AppError::Unauthorized(format!("unknown user '{username}'")))
                }
            }
        }
        AuthMethod::Cas => Ok(runtime.cas_login_url.as_deref().map_or(Strategy::Skip, |url| {
            Strategy::Redirect(external_login(url, "service", return_to))
        })),
        AuthMethod::OAuth => Ok(runtime.oauth_login_url.as_deref().map_or(Strategy::Skip, |url| {
            Strategy::Redirect(external_login(url, "redirect_uri", return_to))
        })),
    }
}

/// Result of the post-login checks.
pub enum CheckOutcome {
    Continue,
    Halt(Response),
}

/// Workflow the user must complete first, in priority order.
#[must_use]
pub fn required_workflow(runtime: &RuntimeSettings, user: &UserAccount) -> Option<Workflow> {
    let checks = [
        (user.force_password_change, Workflow::ChangePassword),
        (user.needs_responses && runtime.force_responses, Workflow::SetupResponses),
        (user.needs_otp && runtime.force_otp, Workflow::SetupOtp),
        (user.needs_profile_update && runtime.force_profile_update, Workflow::UpdateProfile),
        (user.password_expired && runtime.expired_password_enabled, Workflow::ExpiredPassword),
    ];
    checks
        .into_iter()
        .find_map(|(required, workflow)| required.then_some(workflow))
}

/// Halt with a redirect unless the request is already on the page of the
/// highest-priority required workflow.
pub fn post_login_check(runtime: &RuntimeSettings, user: &UserAccount, path: &str) -> CheckOutcome {
    match required_workflow(runtime, user) {
        Some(workflow) if workflow_path(workflow) != path => {
            tracing::debug!(username = %user.username, ?workflow, "redirecting to required workflow");
            CheckOutcome::Halt(redirect(workflow_path(workflow)))
        }
        _ => CheckOutcome::Continue,
    }
}

pub async fn authentication(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_owned();
    if !is_private_path(&path) || is_config_path(&path) {
        return next.run(req).await;
    }

    let Some(CurrentSession(session)) = req.extensions().get::<CurrentSession>().cloned() else {
        return AppError::Internal("session filter did not run".to_owned()).into_response();
    };
    let runtime = state.runtime().await;

    let user = if let Some(user) = session.user {
        user
    } else {
        let return_to = path_and_query(req.uri());
        let mut authenticated = None;
        for method in &runtime.auth_methods {
            match try_strategy(*method, &state, &runtime, req.headers(), &return_to).await {
                Ok(Strategy::Authenticated(account)) => {
                    tracing::info!(username = %account.username, ?method, "user authenticated");
                    authenticated = Some(account);
                    break;
                }
                Ok(Strategy::Redirect(location)) => return redirect(&location),
                Ok(Strategy::Skip) => {}
                Err(e) => return e.into_response(),
            }
        }
        let Some(account) = authenticated else {
            let location = format!("{LOGIN_PATH}?next={}", urlencoding::encode(&return_to));
            return redirect(&location);
        };
        let stored = account.clone();
        state
            .sessions
            .update(&session.id, move |s| s.user = Some(stored))
            .await;
        account
    };

    if let CheckOutcome::Halt(response) = post_login_check(&runtime, &user, &path) {
        return response;
    }

    req.extensions_mut().insert(AuthenticatedUser(user));
    next.run(req).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use selfpass_core::SecurityKey;
    use selfpass_core::StoredConfiguration;

    fn runtime() -> RuntimeSettings {
        let config = StoredConfiguration::new_empty(SecurityKey::from_passphrase("auth").unwrap());
        RuntimeSettings::from_config(&config, false).unwrap()
    }

    #[test]
    fn forced_change_outranks_expiry() {
        let runtime = runtime();
        let mut user = UserAccount::new("dave");
        user.password_expired = true;
        assert_eq!(required_workflow(&runtime, &user), Some(Workflow::ExpiredPassword));
        user.force_password_change = true;
        assert_eq!(required_workflow(&runtime, &user), Some(Workflow::ChangePassword));
    }

    #[test]
    fn setup_flags_need_the_force_setting() {
        let mut runtime = runtime();
        let mut user = UserAccount::new("erin");
        user.needs_responses = true;
        user.needs_otp = true;
        assert_eq!(required_workflow(&runtime, &user), None);

        runtime.force_otp = true;
        assert_eq!(required_workflow(&runtime, &user), Some(Workflow::SetupOtp));
        runtime.force_responses = true;
        assert_eq!(required_workflow(&runtime, &user), Some(Workflow::SetupResponses));
    }

    #[test]
    fn own_page_is_exempt() {
        let runtime = runtime();
        let mut user = UserAccount::new("frank");
        user.force_password_change = true;
        assert!(matches!(
            post_login_check(&runtime, &user, "/private/change-password"),
            CheckOutcome::Continue
        ));
        assert!(matches!(
            post_login_check(&runtime, &user, "/private/"),
            CheckOutcome::Halt(_)
        ));
    }

    #[test]
    fn external_login_appends_return_address() {
        assert_eq!(
            external_login("https://cas.example.com/login", "service", "/private/?a=1"),
            "https://cas.example.com/login?service=%2Fprivate%2F%3Fa%3D1"
        );
        assert_eq!(
            external_login("https://idp.example.com/auth?client=x", "redirect_uri", "/private/"),
            "https://idp.example.com/auth?client=x&redirect_uri=%2Fprivate%2F"
        );
    }
}
