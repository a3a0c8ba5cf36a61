//! Session endpoints.
//!
//! - POST `/signup` - Register a member
//! - POST `/login` - Exchange email and password for a token pair
//! - POST `/reissue` - Rotate a token pair
//! - POST `/logout` - End the caller's session

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::{ApiError, ResultExt};
use super::members::MemberResponse;
use crate::auth::{AnyRole, Auth};
use crate::db::Database;
use crate::service::{AuthService, TokenPair};

#[derive(Clone)]
pub struct AuthState {
    pub db: Database,
    pub service: Arc<AuthService>,
    /// Scheme tag reported as `grantType`
    pub grant_type: Arc<str>,
}

pub fn router(state: AuthState) -> Router {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/reissue", post(reissue))
        .route("/logout", post(logout))
        .with_state(state)
}

#[derive(Deserialize)]
struct SignupRequest {
    email: String,
    password: String,
    name: String,
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReissueRequest {
    access_token: String,
    refresh_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenPairResponse {
    grant_type: String,
    access_token: String,
    refresh_token: String,
    access_token_expires_at: u64,
}

impl TokenPairResponse {
    fn new(grant_type: &str, pair: TokenPair) -> Self {
        Self {
            grant_type: grant_type.to_string(),
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            access_token_expires_at: pair.access_token_expires_at,
        }
    }
}

async fn signup(
    State(state): State<AuthState>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let subject = state
        .service
        .signup(&req.email, &req.password, &req.name)
        .await?;

    let member = state
        .db
        .users()
        .get_by_uuid(&subject)
        .await
        .db_err("Failed to load new member")?
        .ok_or_else(|| ApiError::internal("Member vanished after signup"))?;

    Ok((StatusCode::CREATED, Json(MemberResponse::from(member))))
}

async fn login(
    State(state): State<AuthState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let pair = state.service.login(&req.email, &req.password).await?;
    Ok(Json(TokenPairResponse::new(&state.grant_type, pair)))
}

async fn reissue(
    State(state): State<AuthState>,
    Json(req): Json<ReissueRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let pair = state
        .service
        .reissue(&req.access_token, &req.refresh_token)
        .await?;
    Ok(Json(TokenPairResponse::new(&state.grant_type, pair)))
}

/// The access token stays valid until it expires; only reissue is cut off.
async fn logout(
    State(state): State<AuthState>,
    auth: Auth<AnyRole>,
) -> Result<impl IntoResponse, ApiError> {
    state.service.logout(auth.subject()).await?;
    Ok(StatusCode::NO_CONTENT)
}
