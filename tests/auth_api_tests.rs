//! Tests for the session endpoints.
//!
//! Tests cover:
//! - Signup validation and duplicate detection
//! - Login with good and bad credentials
//! - Reissue rotation, replay of a superseded refresh token, expiry
//! - Logout ending the session

mod common;

use axum::http::{Method, StatusCode, header};
use common::*;
use serde_json::json;
use tokenkeep::db::UserRole;
use tokenkeep::refresh::RefreshStore;

#[tokio::test]
async fn test_signup_creates_member() {
    let t = create_test_app().await;

    let response = send(
        &t.app,
        Method::POST,
        "/auth/signup",
        Some(json!({ "email": "new@example.com", "password": "long-enough", "name": "New" })),
        None,
    )
    .await;

    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.body["email"], "new@example.com");
    assert_eq!(response.body["name"], "New");
    assert_eq!(response.body["role"], "user");
    assert!(response.body["subject"].is_string());
    assert!(response.body["createdAt"].is_string());
    assert!(response.body.get("passwordHash").is_none());

    let login = send(
        &t.app,
        Method::POST,
        "/auth/login",
        Some(json!({ "email": "new@example.com", "password": "long-enough" })),
        None,
    )
    .await;
    assert_eq!(login.status, StatusCode::OK);
}

#[tokio::test]
async fn test_signup_duplicate_email() {
    let t = create_test_app().await;
    seed_member(&t.db, "taken@example.com", UserRole::User).await;

    let response = send(
        &t.app,
        Method::POST,
        "/auth/signup",
        Some(json!({ "email": "TAKEN@example.com", "password": "long-enough", "name": "Dup" })),
        None,
    )
    .await;

    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(response.body["code"], "DUPLICATE_IDENTIFIER");
}

#[tokio::test]
async fn test_signup_invalid_input() {
    let t = create_test_app().await;

    let response = send(
        &t.app,
        Method::POST,
        "/auth/signup",
        Some(json!({ "email": "new@example.com", "password": "short", "name": "New" })),
        None,
    )
    .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_login_returns_token_pair() {
    let t = create_test_app().await;
    let subject = seed_member(&t.db, "u1@example.com", UserRole::User).await;

    let response = login(&t.app, "u1@example.com").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["grantType"], "Bearer");
    assert_eq!(response.body["accessTokenExpiresAt"], START + ACCESS_TTL);

    let (_, refresh) = tokens(&response);
    let stored = t.db.tokens().get(&subject).await.unwrap();
    assert_eq!(stored.as_deref(), Some(refresh.as_str()));
}

#[tokio::test]
async fn test_login_bad_credentials() {
    let t = create_test_app().await;
    seed_member(&t.db, "u1@example.com", UserRole::User).await;

    let wrong_password = send(
        &t.app,
        Method::POST,
        "/auth/login",
        Some(json!({ "email": "u1@example.com", "password": "wrong-password" })),
        None,
    )
    .await;
    let unknown_user = login(&t.app, "nobody@example.com").await;

    for response in [wrong_password, unknown_user] {
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.body["code"], "INVALID_CREDENTIAL");
    }
}

#[tokio::test]
async fn test_reissue_rotation_flow() {
    let t = create_test_app().await;
    let subject = seed_member(&t.db, "u1@example.com", UserRole::User).await;

    let (a1, r1) = tokens(&login(&t.app, "u1@example.com").await);

    // A1 expires, R1 does not
    t.clock.advance(ACCESS_TTL + 10);
    let me = send(&t.app, Method::GET, "/members/me", None, Some(&bearer(&a1))).await;
    assert_eq!(me.status, StatusCode::UNAUTHORIZED);

    let response = reissue(&t.app, &a1, &r1).await;
    assert_eq!(response.status, StatusCode::OK);
    let (a2, r2) = tokens(&response);
    assert_ne!(a1, a2);
    assert_ne!(r1, r2);

    let stored = t.db.tokens().get(&subject).await.unwrap();
    assert_eq!(stored.as_deref(), Some(r2.as_str()));

    let me = send(&t.app, Method::GET, "/members/me", None, Some(&bearer(&a2))).await;
    assert_eq!(me.status, StatusCode::OK);

    // R1 was consumed by the rotation
    let replay = reissue(&t.app, &a1, &r1).await;
    assert_eq!(replay.status, StatusCode::UNAUTHORIZED);
    assert_eq!(replay.body["code"], "REFRESH_TOKEN_MISMATCH");
}

#[tokio::test]
async fn test_reissue_with_expired_refresh_token() {
    let t = create_test_app().await;
    seed_member(&t.db, "u1@example.com", UserRole::User).await;
    let (access, refresh) = tokens(&login(&t.app, "u1@example.com").await);

    t.clock.advance(REFRESH_TTL);

    let response = reissue(&t.app, &access, &refresh).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["code"], "INVALID_REFRESH_TOKEN");
}

#[tokio::test]
async fn test_reissue_with_garbage_access_token() {
    let t = create_test_app().await;
    seed_member(&t.db, "u1@example.com", UserRole::User).await;
    let (_, refresh) = tokens(&login(&t.app, "u1@example.com").await);

    let response = reissue(&t.app, "garbage", &refresh).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["code"], "INVALID_ACCESS_TOKEN");
}

#[tokio::test]
async fn test_logout_ends_session() {
    let t = create_test_app().await;
    let subject = seed_member(&t.db, "u1@example.com", UserRole::User).await;
    let (access, refresh) = tokens(&login(&t.app, "u1@example.com").await);

    let response = send(&t.app, Method::POST, "/auth/logout", None, Some(&bearer(&access))).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);
    assert_eq!(t.db.tokens().get(&subject).await.unwrap(), None);

    let response = reissue(&t.app, &access, &refresh).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["code"], "SESSION_NOT_FOUND");
}

#[tokio::test]
async fn test_logout_requires_authentication() {
    let t = create_test_app().await;

    let response = send(&t.app, Method::POST, "/auth/logout", None, None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers[header::WWW_AUTHENTICATE], "Bearer");
}

#[tokio::test]
async fn test_second_login_invalidates_first_refresh_token() {
    let t = create_test_app().await;
    seed_member(&t.db, "u1@example.com", UserRole::User).await;

    let (a1, r1) = tokens(&login(&t.app, "u1@example.com").await);
    let (a2, r2) = tokens(&login(&t.app, "u1@example.com").await);
    assert_eq!(t.db.tokens().count().await.unwrap(), 1);

    let response = reissue(&t.app, &a1, &r1).await;
    assert_eq!(response.body["code"], "REFRESH_TOKEN_MISMATCH");

    let response = reissue(&t.app, &a2, &r2).await;
    assert_eq!(response.status, StatusCode::OK);
}
