#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use serde_json::Value;
use std::sync::Arc;
use tokenkeep::{
    ServerConfig, create_app,
    credentials::{BcryptVerifier, CredentialVerifier},
    db::{Database, NewMember, UserRole},
    jwt::{ManualClock, TokenLifetimes},
};
use tower::ServiceExt;

pub const START: u64 = 1_700_000_000;
pub const ACCESS_TTL: u64 = 300;
pub const REFRESH_TTL: u64 = 3600;
pub const PASSWORD: &str = "correct-password";

pub struct TestApp {
    pub app: Router,
    pub db: Database,
    pub clock: Arc<ManualClock>,
}

/// Build a config around an in-memory database with a manual clock.
pub async fn test_config() -> (ServerConfig, Arc<ManualClock>) {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let clock = Arc::new(ManualClock::new(START));

    let mut config = ServerConfig::new(db, b"integration-test-secret".to_vec());
    config.lifetimes = TokenLifetimes::new(ACCESS_TTL, REFRESH_TTL).expect("Invalid lifetimes");
    config.bcrypt_cost = 4;
    config.clock = clock.clone();
    (config, clock)
}

pub fn build(config: ServerConfig, clock: Arc<ManualClock>) -> TestApp {
    TestApp {
        app: create_app(&config),
        db: config.db.clone(),
        clock,
    }
}

pub async fn create_test_app() -> TestApp {
    let (config, clock) = test_config().await;
    build(config, clock)
}

/// Insert a member with `PASSWORD` and return its subject.
pub async fn seed_member(db: &Database, email: &str, role: UserRole) -> String {
    let hash = BcryptVerifier::new(4)
        .hash(PASSWORD)
        .expect("Failed to hash password");
    db.users()
        .create(NewMember {
            email,
            password_hash: &hash,
            name: "Test Member",
            role,
        })
        .await
        .expect("Failed to create member")
        .expect("Email already taken")
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

/// Send a request through the router in-process.
pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
    authorization: Option<&str>,
) -> TestResponse {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(authorization) = authorization {
        builder = builder.header(header::AUTHORIZATION, authorization);
    }
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).expect("Failed to build request"))
        .await
        .expect("Request failed");

    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };

    TestResponse {
        status,
        headers,
        body,
    }
}

pub async fn login(app: &Router, email: &str) -> TestResponse {
    send(
        app,
        Method::POST,
        "/auth/login",
        Some(serde_json::json!({ "email": email, "password": PASSWORD })),
        None,
    )
    .await
}

pub async fn reissue(app: &Router, access_token: &str, refresh_token: &str) -> TestResponse {
    send(
        app,
        Method::POST,
        "/auth/reissue",
        Some(serde_json::json!({
            "accessToken": access_token,
            "refreshToken": refresh_token,
        })),
        None,
    )
    .await
}

pub fn tokens(response: &TestResponse) -> (String, String) {
    (
        response.body["accessToken"]
            .as_str()
            .expect("Missing accessToken")
            .to_string(),
        response.body["refreshToken"]
            .as_str()
            .expect("Missing refreshToken")
            .to_string(),
    )
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}
