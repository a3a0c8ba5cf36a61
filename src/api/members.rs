use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::get,
};
use serde::Serialize;

use super::error::{ApiError, ResultExt};
use crate::auth::{AdminOnly, AnyRole, Auth};
use crate::db::{Database, Member, UserRole};

#[derive(Clone)]
pub struct MembersState {
    pub db: Database,
}

pub fn router(state: MembersState) -> Router {
    Router::new()
        .route("/me", get(me))
        .route("/{email}", get(by_email))
        .with_state(state)
}

/// Public view of a member. Never includes the password hash.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberResponse {
    pub subject: String,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub created_at: String,
}

impl From<Member> for MemberResponse {
    fn from(member: Member) -> Self {
        Self {
            subject: member.uuid,
            email: member.email,
            name: member.name,
            role: member.role,
            created_at: member.created_at,
        }
    }
}

async fn me(
    State(state): State<MembersState>,
    auth: Auth<AnyRole>,
) -> Result<impl IntoResponse, ApiError> {
    // The token may outlive the account
    let member = state
        .db
        .users()
        .get_by_uuid(auth.subject())
        .await
        .db_err("Failed to get member")?
        .ok_or_else(|| ApiError::not_found("Member not found"))?;

    Ok(Json(MemberResponse::from(member)))
}

async fn by_email(
    State(state): State<MembersState>,
    _auth: Auth<AdminOnly>,
    Path(email): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let member = state
        .db
        .users()
        .get_by_email(&email)
        .await
        .db_err("Failed to get member")?
        .ok_or_else(|| ApiError::not_found("Member not found"))?;

    Ok(Json(MemberResponse::from(member)))
}
