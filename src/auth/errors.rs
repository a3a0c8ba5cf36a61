//! Authentication error types.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum AuthErrorKind {
    NotAuthenticated,
    InsufficientRole,
}

/// Rejection from the `Auth` extractor.
#[derive(Debug)]
pub struct ApiAuthError {
    kind: AuthErrorKind,
    scheme: std::sync::Arc<str>,
}

impl ApiAuthError {
    pub(super) fn new(kind: AuthErrorKind, scheme: std::sync::Arc<str>) -> Self {
        Self { kind, scheme }
    }

    fn status_code(&self) -> StatusCode {
        match self.kind {
            AuthErrorKind::NotAuthenticated => StatusCode::UNAUTHORIZED,
            AuthErrorKind::InsufficientRole => StatusCode::FORBIDDEN,
        }
    }

    fn message(&self) -> &'static str {
        match self.kind {
            AuthErrorKind::NotAuthenticated => "Not authenticated",
            AuthErrorKind::InsufficientRole => "Insufficient permissions",
        }
    }

    fn code(&self) -> &'static str {
        match self.kind {
            AuthErrorKind::NotAuthenticated => "NOT_AUTHENTICATED",
            AuthErrorKind::InsufficientRole => "INSUFFICIENT_ROLE",
        }
    }
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
            code: &'static str,
        }

        let mut response = (
            self.status_code(),
            Json(ErrorResponse {
                error: self.message(),
                code: self.code(),
            }),
        )
            .into_response();

        if self.kind == AuthErrorKind::NotAuthenticated {
            if let Ok(value) = HeaderValue::from_str(&self.scheme) {
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, value);
            }
        }

        response
    }
}
