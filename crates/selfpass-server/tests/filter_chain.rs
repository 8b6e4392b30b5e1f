//! End-to-end tests of the filter chain through the full router.

#![allow(clippy::unwrap_used)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::header::{
    AUTHORIZATION, CACHE_CONTROL, CONTENT_SECURITY_POLICY, CONTENT_TYPE, COOKIE, LOCATION,
    SET_COOKIE, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS,
};
use axum::http::{Method, Request, Response, StatusCode};
use tower::ServiceExt;

use selfpass_core::setting::SettingKey;
use selfpass_core::util;
use selfpass_core::value::{BooleanValue, NumericValue, StringValue};
use selfpass_core::{SecurityKey, StoredConfiguration, StoredValue};
use selfpass_server::build_router;
use selfpass_server::directory::{MemoryDirectory, UserAccount};
use selfpass_server::state::{AppState, DEFAULT_CONFIG_KEY};
use selfpass_storage::{MemoryBackend, StorageBackend};

const CONFIG_PASSWORD: &str = "config-admin-pw";

async fn directory() -> MemoryDirectory {
    let directory = MemoryDirectory::new();
    directory.insert(UserAccount::new("alice"), "alice-pw").await;
    let mut bob = UserAccount::new("bob");
    bob.force_password_change = true;
    directory.insert(bob, "bob-pw").await;
    directory
}

async fn configured(edit: impl FnOnce(&mut StoredConfiguration)) -> Router {
    let mut config =
        StoredConfiguration::new_empty(SecurityKey::from_passphrase("filter-chain").unwrap());
    config.set_config_password(CONFIG_PASSWORD);
    edit(&mut config);
    let state = AppState::new(
        config,
        Arc::new(MemoryBackend::new()),
        DEFAULT_CONFIG_KEY,
        Arc::new(directory().await),
    )
    .unwrap();
    build_router(Arc::new(state))
}

fn write(config: &mut StoredConfiguration, key: SettingKey, value: StoredValue) {
    config.write_setting(key, value).unwrap();
}

fn get(uri: &str, cookies: &[(&str, &str)]) -> Request<Body> {
    request(Method::GET, uri, cookies, None)
}

fn request(method: Method, uri: &str, cookies: &[(&str, &str)], json: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if !cookies.is_empty() {
        let header: Vec<String> = cookies.iter().map(|(k, v)| format!("{k}={v}")).collect();
        builder = builder.header(COOKIE, header.join("; "));
    }
    let body = match json {
        Some(json) => {
            builder = builder.header(CONTENT_TYPE, "application/json");
            Body::from(json.to_owned())
        }
        None => Body::empty(),
    };
    let mut req = builder.body(body).unwrap();
    req.extensions_mut()
        .insert(ConnectInfo(SocketAddr::from(([203, 0, 113, 7], 50000))));
    req
}

async fn send(app: &Router, req: Request<Body>) -> Response<Body> {
    app.clone().oneshot(req).await.unwrap()
}

async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn location(response: &Response<Body>) -> String {
    response.headers()[LOCATION].to_str().unwrap().to_owned()
}

fn cookie(response: &Response<Body>, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_owned())
}

/// Run the verification round trip and return the verified session id.
async fn verified_session(app: &Router) -> String {
    let first = send(app, get("/private/config/guide", &[])).await;
    assert_eq!(first.status(), StatusCode::SEE_OTHER);
    let id = cookie(&first, "SELFPASSID").unwrap();
    let target = location(&first);
    assert!(target.starts_with("/private/config/guide?verifySession="));

    let second = send(app, get(&target, &[("SELFPASSID", id.as_str())])).await;
    assert_eq!(second.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&second), "/private/config/guide");
    id
}

#[tokio::test]
async fn new_installation_only_reaches_health_and_guide() {
    let state = AppState::load(
        Arc::new(MemoryBackend::new()),
        DEFAULT_CONFIG_KEY,
        Some("new-install"),
        Arc::new(MemoryDirectory::new()),
    )
    .await
    .unwrap();
    let app = build_router(Arc::new(state));

    let health = send(&app, get("/public/health", &[])).await;
    assert_eq!(health.status(), StatusCode::OK);
    assert_eq!(json_body(health).await["mode"], "NEW");

    let page = send(&app, get("/private/", &[])).await;
    assert_eq!(page.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&page), "/private/config/guide");

    let id = verified_session(&app).await;
    let set = send(
        &app,
        request(
            Method::POST,
            "/private/config/guide",
            &[("SELFPASSID", id.as_str())],
            Some(r#"{"password": "first-pw"}"#),
        ),
    )
    .await;
    assert_eq!(set.status(), StatusCode::OK);
    assert_eq!(json_body(set).await["mode"], "CONFIGURATION");

    let again = send(
        &app,
        request(
            Method::POST,
            "/private/config/guide",
            &[("SELFPASSID", id.as_str())],
            Some(r#"{"password": "second-pw"}"#),
        ),
    )
    .await;
    assert_eq!(again.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn unreadable_configuration_serves_only_health() {
    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::with_entries([(
        DEFAULT_CONFIG_KEY,
        b"<PwmConfiguration><settings><setting key=\"idleTimeoutSeconds\" syntax=\"DURATION\"><value>soon</value></setting></settings></PwmConfiguration>".to_vec(),
    )]));
    let state = AppState::load(storage, DEFAULT_CONFIG_KEY, Some("k"), Arc::new(MemoryDirectory::new()))
        .await
        .unwrap();
    let app = build_router(Arc::new(state));

    let health = send(&app, get("/public/health", &[])).await;
    assert_eq!(health.status(), StatusCode::OK);
    let body = json_body(health).await;
    assert_eq!(body["mode"], "ERROR");
    assert!(body["error"].as_str().unwrap().contains("idleTimeoutSeconds"));

    let login = send(&app, get("/public/login", &[])).await;
    assert_eq!(login.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(login).await["error"], "application_error");
}

#[tokio::test]
async fn overlong_uri_is_rejected() {
    let app = configured(|_| {}).await;
    let uri = format!("/public/login?pad={}", "x".repeat(9000));
    let response = send(&app, get(&uri, &[])).await;
    assert_eq!(response.status(), StatusCode::URI_TOO_LONG);
    assert_eq!(json_body(response).await["error"], "uri_too_long");
}

#[tokio::test]
async fn security_headers_on_every_response() {
    let app = configured(|_| {}).await;
    let response = send(&app, get("/public/health", &[])).await;

    let csp = response.headers()[CONTENT_SECURITY_POLICY].to_str().unwrap();
    assert!(csp.contains("'nonce-"));
    assert!(!csp.contains("%NONCE%"));
    assert_eq!(response.headers()[X_FRAME_OPTIONS], "DENY");
    assert_eq!(response.headers()[X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert_eq!(response.headers()[CACHE_CONTROL], "no-store");
    assert!(response.headers().contains_key("x-request-id"));

    let unframed = configured(|c| {
        write(c, SettingKey::SecurityPreventFraming, StoredValue::Boolean(BooleanValue::new(false)));
    })
    .await;
    let response = send(&unframed, get("/public/health", &[])).await;
    assert!(!response.headers().contains_key(X_FRAME_OPTIONS));
}

#[tokio::test]
async fn session_verification_round_trip() {
    let app = configured(|_| {}).await;
    let id = verified_session(&app).await;

    let page = send(&app, get("/public/login", &[("SELFPASSID", id.as_str())])).await;
    assert_eq!(page.status(), StatusCode::OK);
    assert_eq!(json_body(page).await["title"], "Password Self Service");
}

#[tokio::test]
async fn token_without_cookie_requires_cookies() {
    let app = configured(|_| {}).await;
    let response = send(&app, get("/public/login?verifySession=abc", &[])).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "cookies_required");
}

#[tokio::test]
async fn mismatched_token_restarts_verification() {
    let app = configured(|_| {}).await;
    let first = send(&app, get("/public/login", &[])).await;
    let id = cookie(&first, "SELFPASSID").unwrap();
    let original = location(&first);

    let wrong = send(&app, get("/public/login?verifySession=wrong", &[("SELFPASSID", id.as_str())])).await;
    assert_eq!(wrong.status(), StatusCode::SEE_OTHER);
    let restarted = location(&wrong);
    assert!(restarted.starts_with("/public/login?verifySession="));
    assert_ne!(restarted, original);

    let done = send(&app, get(&restarted, &[("SELFPASSID", id.as_str())])).await;
    assert_eq!(location(&done), "/public/login");
}

#[tokio::test]
async fn post_before_verification_requires_cookies() {
    let app = configured(|_| {}).await;
    let response = send(
        &app,
        request(Method::POST, "/public/login", &[], Some(r#"{"username":"a","password":"b"}"#)),
    )
    .await;
    assert_eq!(json_body(response).await["error"], "cookies_required");
}

#[tokio::test]
async fn disabled_verification_issues_session_directly() {
    let app = configured(|c| {
        write(c, SettingKey::SessionVerificationEnable, StoredValue::Boolean(BooleanValue::new(false)));
    })
    .await;
    let response = send(&app, get("/public/login", &[])).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(cookie(&response, "SELFPASSID").is_some());
}

#[tokio::test]
async fn unauthenticated_private_request_goes_to_login() {
    let app = configured(|_| {}).await;
    let id = verified_session(&app).await;
    let response = send(&app, get("/private/?tab=links", &[("SELFPASSID", id.as_str())])).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/public/login?next=%2Fprivate%2F%3Ftab%3Dlinks");
}

#[tokio::test]
async fn form_login_then_summary() {
    let app = configured(|_| {}).await;
    let id = verified_session(&app).await;

    let bad = send(
        &app,
        request(
            Method::POST,
            "/public/login",
            &[("SELFPASSID", id.as_str())],
            Some(r#"{"username":"alice","password":"nope"}"#),
        ),
    )
    .await;
    assert_eq!(bad.status(), StatusCode::UNAUTHORIZED);

    let good = send(
        &app,
        request(
            Method::POST,
            "/public/login",
            &[("SELFPASSID", id.as_str())],
            Some(r#"{"username":"alice","password":"alice-pw","next":"//evil.example.com"}"#),
        ),
    )
    .await;
    assert_eq!(good.status(), StatusCode::OK);
    assert_eq!(json_body(good).await["redirect"], "/private/");

    let summary = send(&app, get("/private/", &[("SELFPASSID", id.as_str())])).await;
    assert_eq!(summary.status(), StatusCode::OK);
    let body = json_body(summary).await;
    assert_eq!(body["username"], "alice");
    assert!(body["pending"].is_null());
}

#[tokio::test]
async fn basic_auth_and_forced_password_change() {
    let app = configured(|_| {}).await;
    let id = verified_session(&app).await;

    let credentials = format!("Basic {}", util::base64_encode(b"bob:bob-pw"));
    let mut req = get("/private/", &[("SELFPASSID", id.as_str())]);
    req.headers_mut().insert(AUTHORIZATION, credentials.parse().unwrap());
    let response = send(&app, req).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/private/change-password");

    let page = send(&app, get("/private/change-password", &[("SELFPASSID", id.as_str())])).await;
    assert_eq!(page.status(), StatusCode::OK);
    assert_eq!(json_body(page).await["required"], true);

    let changed = send(
        &app,
        request(
            Method::POST,
            "/private/change-password",
            &[("SELFPASSID", id.as_str())],
            Some(r#"{"password":"bob-new-pw"}"#),
        ),
    )
    .await;
    assert_eq!(changed.status(), StatusCode::OK);
    assert_eq!(json_body(changed).await["redirect"], "/private/");

    let summary = send(&app, get("/private/", &[("SELFPASSID", id.as_str())])).await;
    assert_eq!(summary.status(), StatusCode::OK);
}

#[tokio::test]
async fn wrong_basic_credentials_are_unauthorized() {
    let app = configured(|_| {}).await;
    let id = verified_session(&app).await;
    let mut req = get("/private/", &[("SELFPASSID", id.as_str())]);
    req.headers_mut().insert(
        AUTHORIZATION,
        format!("Basic {}", util::base64_encode(b"alice:wrong")).parse().unwrap(),
    );
    assert_eq!(send(&app, req).await.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn sso_header_authenticates() {
    let app = configured(|c| {
        write(c, SettingKey::SsoAuthHeaderName, StoredValue::String(StringValue::new("X-Remote-User")));
    })
    .await;
    let id = verified_session(&app).await;
    let mut req = get("/private/", &[("SELFPASSID", id.as_str())]);
    req.headers_mut().insert("x-remote-user", "alice".parse().unwrap());
    let response = send(&app, req).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["username"], "alice");
}

#[tokio::test]
async fn cas_redirects_to_external_login() {
    let app = configured(|c| {
        write(
            c,
            SettingKey::CasLoginUrl,
            StoredValue::String(StringValue::new("https://cas.example.com/login")),
        );
    })
    .await;
    let id = verified_session(&app).await;
    let response = send(&app, get("/private/", &[("SELFPASSID", id.as_str())])).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "https://cas.example.com/login?service=%2Fprivate%2F");
}

#[tokio::test]
async fn config_pages_require_config_login() {
    let app = configured(|_| {}).await;
    let id = verified_session(&app).await;

    let denied = send(&app, get("/private/config/settings", &[("SELFPASSID", id.as_str())])).await;
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

    let login = send(
        &app,
        request(
            Method::POST,
            "/private/config/login",
            &[("SELFPASSID", id.as_str())],
            Some(&format!(r#"{{"password":"{CONFIG_PASSWORD}"}}"#)),
        ),
    )
    .await;
    assert_eq!(login.status(), StatusCode::OK);
    assert!(cookie(&login, "COOKIE_PERSISTENT_CONFIG_LOGIN").is_none());

    let listed = send(&app, get("/private/config/settings", &[("SELFPASSID", id.as_str())])).await;
    assert_eq!(listed.status(), StatusCode::OK);
    let body = json_body(listed).await;
    assert_eq!(body["locked"], false);
    assert_eq!(body["settings"].as_array().unwrap().len(), SettingKey::ALL.len());
}

#[tokio::test]
async fn failed_config_logins_lock_out_client() {
    let app = configured(|c| {
        write(c, SettingKey::IntruderConfigMaxAttempts, StoredValue::Numeric(NumericValue::new(2)));
    })
    .await;
    let id = verified_session(&app).await;
    let attempt = |password: &str| {
        request(
            Method::POST,
            "/private/config/login",
            &[("SELFPASSID", id.as_str())],
            Some(&format!(r#"{{"password":"{password}"}}"#)),
        )
    };

    assert_eq!(send(&app, attempt("bad-1")).await.status(), StatusCode::UNAUTHORIZED);
    let locked = send(&app, attempt("bad-2")).await;
    assert_eq!(locked.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(locked).await["error"], "intruder_lockout");

    let refused = send(&app, attempt(CONFIG_PASSWORD)).await;
    assert_eq!(refused.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn persistent_cookie_works_in_a_new_session() {
    let app = configured(|_| {}).await;
    let id = verified_session(&app).await;
    let login = send(
        &app,
        request(
            Method::POST,
            "/private/config/login",
            &[("SELFPASSID", id.as_str())],
            Some(&format!(r#"{{"password":"{CONFIG_PASSWORD}","remember":true}}"#)),
        ),
    )
    .await;
    let persistent = cookie(&login, "COOKIE_PERSISTENT_CONFIG_LOGIN").unwrap();
    assert_eq!(json_body(login).await["persistent_seconds"], 3600);

    let fresh = verified_session(&app).await;
    let response = send(
        &app,
        get(
            "/private/config/settings",
            &[("SELFPASSID", fresh.as_str()), ("COOKIE_PERSISTENT_CONFIG_LOGIN", persistent.as_str())],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn settings_edit_and_export() {
    let app = configured(|_| {}).await;
    let id = verified_session(&app).await;
    send(
        &app,
        request(
            Method::POST,
            "/private/config/login",
            &[("SELFPASSID", id.as_str())],
            Some(&format!(r#"{{"password":"{CONFIG_PASSWORD}"}}"#)),
        ),
    )
    .await;
    let cookies = [("SELFPASSID", id.as_str())];

    let invalid = send(
        &app,
        request(Method::PUT, "/private/config/settings/idleTimeoutSeconds", &cookies, Some("5")),
    )
    .await;
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

    let updated = send(
        &app,
        request(Method::PUT, "/private/config/settings/idleTimeoutSeconds", &cookies, Some("1200")),
    )
    .await;
    assert_eq!(updated.status(), StatusCode::OK);
    let body = json_body(updated).await;
    assert_eq!(body["is_default"], false);
    assert_eq!(body["syntax"], "DURATION");

    let unknown = send(&app, get("/private/config/settings/no.such.key", &cookies)).await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

    let export = send(&app, get("/private/config/export", &cookies)).await;
    assert_eq!(export.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(export.into_body(), usize::MAX).await.unwrap();
    let xml = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(xml.contains(r#"key="idleTimeoutSeconds""#));

    let reset = send(
        &app,
        request(Method::DELETE, "/private/config/settings/idleTimeoutSeconds", &cookies, None),
    )
    .await;
    assert_eq!(json_body(reset).await["is_default"], true);
}
