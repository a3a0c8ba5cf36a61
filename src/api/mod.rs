mod auth;
mod error;
mod members;

use axum::{Json, Router, routing::get};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::db::Database;
use crate::service::AuthService;

pub use error::ApiError;

/// Create the API router. Routes behind `Auth` expect the `authenticate`
/// middleware to be layered on top by the caller.
pub fn create_api_router(db: Database, service: Arc<AuthService>, bearer_scheme: &str) -> Router {
    let auth_state = auth::AuthState {
        db: db.clone(),
        service,
        grant_type: Arc::from(bearer_scheme),
    };

    let members_state = members::MembersState { db };

    Router::new()
        .route("/health", get(health))
        .nest("/auth", auth::router(auth_state))
        .nest("/members", members::router(members_state))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
