#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode},
};
use serde_json::Value;
use sessiongate::api::gate_config;
use sessiongate::config::{TokenPolicy, TokenSettings};
use sessiongate::db::Database;
use sessiongate::jwt::TokenAuthenticator;
use sessiongate::mailer::RecordingMailer;
use sessiongate::{AppConfig, Backends, create_app};
use tower::ServiceExt;
use url::Url;

pub const ISSUER: &str = "sessiongate-test";
pub const ACCESS_SECRET: &[u8] = b"test-access-secret-test-access-secret";
pub const REFRESH_SECRET: &[u8] = b"test-refresh-secret-test-refresh-secret";
pub const RESET_SECRET: &[u8] = b"test-reset-secret-test-reset-secret-00";
pub const RESET_URL: &str = "http://localhost:3000/reset-password";

pub struct TestApp {
    pub router: Router,
    pub db: Database,
    pub mailer: RecordingMailer,
}

pub fn test_policy() -> TokenPolicy {
    TokenPolicy::new(
        ISSUER,
        TokenSettings::new(ACCESS_SECRET, Duration::from_secs(900)),
        TokenSettings::new(REFRESH_SECRET, Duration::from_secs(1_209_600)),
        TokenSettings::new(RESET_SECRET, Duration::from_secs(900)),
    )
    .expect("Invalid test policy")
}

pub fn test_authenticator() -> TokenAuthenticator {
    TokenAuthenticator::new(ISSUER, ISSUER)
}

pub async fn create_test_app() -> TestApp {
    create_test_app_with(RecordingMailer::new()).await
}

pub async fn create_test_app_with(mailer: RecordingMailer) -> TestApp {
    create_test_app_at(":memory:", mailer).await
}

pub async fn create_test_app_at(path: &str, mailer: RecordingMailer) -> TestApp {
    let db = Database::open(path)
        .await
        .expect("Failed to open test database");
    let config = AppConfig {
        policy: test_policy(),
        reset_url: Url::parse(RESET_URL).expect("Invalid URL"),
        request_timeout: Some(Duration::from_secs(30)),
        gate: gate_config(Vec::<String>::new()),
    };
    let router = create_app(&config, Backends::sqlite(&db, Arc::new(mailer.clone())));

    TestApp { router, db, mailer }
}

/// SQLite file in the temp dir, removed with its journal files on drop.
pub struct TempDbFile(PathBuf);

impl TempDbFile {
    pub fn new() -> Self {
        Self(std::env::temp_dir().join(format!("sessiongate-test-{}.db", uuid::Uuid::new_v4())))
    }

    pub fn path(&self) -> &str {
        self.0.to_str().expect("Temp path is not UTF-8")
    }
}

impl Drop for TempDbFile {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm", "-journal"] {
            let mut path = self.0.clone().into_os_string();
            path.push(suffix);
            std::fs::remove_file(path).ok();
        }
    }
}

pub async fn send(app: &TestApp, request: Request<Body>) -> Response<Body> {
    app.router
        .clone()
        .oneshot(request)
        .await
        .expect("Router is infallible")
}

pub fn post_json(uri: &str, bearer: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = bearer {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn get(uri: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = bearer {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Register an account and return the token response body.
pub async fn register(app: &TestApp, email: &str, password: &str) -> Value {
    let response = send(
        app,
        post_json(
            "/api/auth/register",
            None,
            serde_json::json!({ "email": email, "password": password }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await
}

pub async fn login(app: &TestApp, email: &str, password: &str) -> Response<Body> {
    send(
        app,
        post_json(
            "/api/auth/login",
            None,
            serde_json::json!({ "email": email, "password": password }),
        ),
    )
    .await
}

/// Request a reset for `email` and return the token from the mailed link.
pub async fn request_reset_token(app: &TestApp, email: &str) -> String {
    let response = send(
        app,
        post_json(
            "/api/auth/password-reset/request",
            None,
            serde_json::json!({ "email": email }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let mail = app.mailer.last().expect("No reset mail was sent");
    token_from_mail(&mail.html_body)
}

/// Extract the `token` query parameter from the link in a reset mail.
pub fn token_from_mail(html: &str) -> String {
    let start = html.find("href=\"").expect("No link in mail") + "href=\"".len();
    let end = start + html[start..].find('"').expect("Unterminated link");
    let link = Url::parse(&html[start..end]).expect("Invalid link");
    link.query_pairs()
        .find(|(k, _)| k == "token")
        .map(|(_, v)| v.into_owned())
        .expect("No token in link")
}
