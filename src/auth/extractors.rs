//! Axum extractors for authentication.
//!
//! These only read what the `authenticate` middleware left in the request
//! extensions; routes that use them must sit behind that middleware.

use std::marker::PhantomData;

use axum::{extract::FromRequestParts, http::request::Parts};

use super::bearer::BearerScheme;
use super::errors::{ApiAuthError, AuthErrorKind};
use super::types::AuthenticatedIdentity;
use crate::db::UserRole;

/// Role requirement checked by `Auth`.
pub trait RoleConstraint: Send + Sync + 'static {
    fn allows(role: UserRole) -> bool;
}

/// Any authenticated user.
pub struct AnyRole;

impl RoleConstraint for AnyRole {
    fn allows(_: UserRole) -> bool {
        true
    }
}

/// Admins only.
pub struct AdminOnly;

impl RoleConstraint for AdminOnly {
    fn allows(role: UserRole) -> bool {
        role == UserRole::Admin
    }
}

/// Requires an authenticated identity whose role satisfies `R`.
/// Rejects with 401 when there is no identity and 403 when the role is not allowed.
pub struct Auth<R: RoleConstraint = AnyRole> {
    pub identity: AuthenticatedIdentity,
    _role: PhantomData<R>,
}

impl<R: RoleConstraint> Auth<R> {
    pub fn subject(&self) -> &str {
        &self.identity.subject
    }

    pub fn role(&self) -> UserRole {
        self.identity.role
    }
}

impl<S, R> FromRequestParts<S> for Auth<R>
where
    S: Send + Sync,
    R: RoleConstraint,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let scheme = parts
            .extensions
            .get::<BearerScheme>()
            .cloned()
            .unwrap_or_default()
            .0;

        let identity = parts
            .extensions
            .get::<AuthenticatedIdentity>()
            .cloned()
            .ok_or_else(|| ApiAuthError::new(AuthErrorKind::NotAuthenticated, scheme.clone()))?;

        if !R::allows(identity.role) {
            tracing::debug!(subject = %identity.subject, role = identity.role.as_str(), "Role not allowed");
            return Err(ApiAuthError::new(AuthErrorKind::InsufficientRole, scheme));
        }

        Ok(Auth {
            identity,
            _role: PhantomData,
        })
    }
}
