//! `selfpass` HTTP server.
//!
//! Wires the core library, the storage backend, and the user directory into
//! an axum application. Every request passes the filter chain in
//! [`filters`] before reaching a route.

pub mod config;
pub mod directory;
pub mod error;
pub mod filters;
pub mod intruder;
pub mod routes;
pub mod runtime;
pub mod session;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::http::HeaderValue;
use axum::http::header::{CACHE_CONTROL, REFERRER_POLICY, X_CONTENT_TYPE_OPTIONS};
use axum::middleware as axum_mw;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the router with all routes and the filter chain.
///
/// Layers wrap from the inside out, so the filters are added in reverse of
/// the order they run.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(routes::public::router())
        .merge(routes::private::router())
        .merge(routes::config::router())
        .layer(axum_mw::from_fn_with_state(
            Arc::clone(&state),
            filters::config_access::config_access,
        ))
        .layer(axum_mw::from_fn_with_state(
            Arc::clone(&state),
            filters::authentication::authentication,
        ))
        .layer(axum_mw::from_fn_with_state(
            Arc::clone(&state),
            filters::session::session_filter,
        ))
        .layer(axum_mw::from_fn_with_state(
            Arc::clone(&state),
            filters::application_mode::application_mode,
        ))
        .layer(axum_mw::from_fn_with_state(
            Arc::clone(&state),
            filters::request_init::request_init,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(tower::limit::ConcurrencyLimitLayer::new(256))
        .layer(SetResponseHeaderLayer::overriding(
            X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            REFERRER_POLICY,
            HeaderValue::from_static("same-origin"),
        ))
        .with_state(state)
}
