//! Session filter.
//!
//! Resolves the `SELFPASSID` cookie to a session, creating one when needed.
//! When session verification is enabled a new session is not trusted until
//! the browser proves it stores cookies: the first `GET` is redirected to
//! the same URL with a `verifySession` token, and the session is marked
//! verified when the token comes back with the cookie.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::Method;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use selfpass_core::util;

use super::{HEALTH_PATH, query_param, redirect, set_cookie, with_query_param, without_query_param};
use crate::error::AppError;
use crate::session::{CurrentSession, SESSION_COOKIE, Session, Verification};
use crate::state::AppState;

/// Query parameter carrying the verification token.
pub const VERIFY_PARAM: &str = "verifySession";

fn redirect_with_cookie(location: &str, session: &Session) -> Response {
    let mut response = redirect(location);
    set_cookie(&mut response, SESSION_COOKIE, &session.id, None);
    response
}

pub async fn session_filter(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    if req.uri().path() == HEALTH_PATH {
        return next.run(req).await;
    }

    let runtime = state.runtime().await;
    let cookie = super::read_cookie(req.headers(), SESSION_COOKIE);
    let token = query_param(req.uri(), VERIFY_PARAM);
    let readable = matches!(*req.method(), Method::GET | Method::HEAD);

    let existing = match &cookie {
        Some(id) => state.sessions.touch(id, runtime.idle_timeout).await,
        None => None,
    };

    let (session, is_new) = match existing {
        Some(session) => (session, false),
        None => {
            if cookie.is_none() && token.is_some() {
                tracing::info!("verification token returned without a session cookie");
                return AppError::CookiesRequired.into_response();
            }
            if runtime.session_verification && !readable {
                return AppError::CookiesRequired.into_response();
            }
            let session = state.sessions.create(!runtime.session_verification).await;
            (session, true)
        }
    };

    let pending = match &session.verification {
        Verification::Verified => None,
        Verification::Pending(expected) => Some(expected.clone()),
    };

    let session = match pending {
        None => session,
        Some(_) if !runtime.session_verification => {
            match state
                .sessions
                .update(&session.id, |s| s.verification = Verification::Verified)
                .await
            {
                Some(updated) => updated,
                None => return AppError::CookiesRequired.into_response(),
            }
        }
        Some(_) if !readable => {
            return AppError::CookiesRequired.into_response();
        }
        Some(expected) => {
            if !is_new && token.as_deref() == Some(expected.as_str()) {
                state
                    .sessions
                    .update(&session.id, |s| s.verification = Verification::Verified)
                    .await;
                tracing::debug!("session verified");
                return redirect(&without_query_param(req.uri(), VERIFY_PARAM));
            }

            // First visit, or a stale token: issue a fresh one.
            let fresh = util::random_token();
            let restarted = state
                .sessions
                .update(&session.id, |s| s.verification = Verification::Pending(fresh.clone()))
                .await;
            let Some(restarted) = restarted else {
                return AppError::CookiesRequired.into_response();
            };
            return redirect_with_cookie(
                &with_query_param(req.uri(), VERIFY_PARAM, &fresh),
                &restarted,
            );
        }
    };

    let session_id = session.id.clone();
    req.extensions_mut().insert(CurrentSession(session));
    let mut response = next.run(req).await;
    if is_new {
        set_cookie(&mut response, SESSION_COOKIE, &session_id, None);
    }
    response
}
