//! Per-request access token verification.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use tracing::debug;

use super::bearer::{BearerScheme, extract_bearer};
use super::types::AuthenticatedIdentity;
use crate::jwt::{TokenCodec, TokenKind};

#[derive(Clone)]
pub struct PipelineState {
    pub codec: Arc<TokenCodec>,
    pub scheme: BearerScheme,
}

impl PipelineState {
    pub fn new(codec: Arc<TokenCodec>, scheme: &str) -> Self {
        Self {
            codec,
            scheme: BearerScheme(Arc::from(scheme)),
        }
    }
}

/// Resolve the identity carried by the request's bearer token, if any.
///
/// Refresh tokens are never accepted here. The user store is not consulted,
/// so a deleted user keeps authenticating until the access token expires.
pub fn identify(
    codec: &TokenCodec,
    headers: &HeaderMap,
    scheme: &str,
) -> Option<AuthenticatedIdentity> {
    let token = extract_bearer(headers, scheme)?;

    let claims = match codec.verify(token) {
        Ok(claims) => claims,
        Err(e) => {
            debug!(error = %e, "Bearer token rejected");
            return None;
        }
    };

    match (claims.kind, claims.role) {
        (TokenKind::Access, Some(role)) => Some(AuthenticatedIdentity {
            subject: claims.sub,
            role,
        }),
        _ => {
            debug!(subject = %claims.sub, "Bearer token is not an access token");
            None
        }
    }
}

/// Middleware that attaches an `AuthenticatedIdentity` to the request when the
/// bearer token verifies, and passes the request on either way.
pub async fn authenticate(
    State(state): State<PipelineState>,
    mut request: Request,
    next: Next,
) -> Response {
    // Whatever was there before did not come from this check
    request.extensions_mut().remove::<AuthenticatedIdentity>();

    if let Some(identity) = identify(&state.codec, request.headers(), &state.scheme.0) {
        request.extensions_mut().insert(identity);
    }
    request.extensions_mut().insert(state.scheme.clone());

    next.run(request).await
}
