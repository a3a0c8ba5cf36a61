//! Login, reissue, signup and logout.
//!
//! Reissue is refresh token rotation: the refresh token presented is swapped
//! for a new one in the store, so each refresh token can be exchanged once.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::credentials::{CredentialVerifier, NewUser, UserDirectory};
use crate::db::UserRole;
use crate::jwt::{TokenCodec, TokenKind};
use crate::refresh::{RefreshStore, StoreError};

/// Default upper bound on a single refresh store call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Caller-visible failures. None of them are retried internally.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredential,
    #[error("Refresh token is invalid or expired")]
    InvalidRefreshToken,
    #[error("Access token is invalid")]
    InvalidAccessToken,
    #[error("Session not found, the user has logged out")]
    SessionNotFound,
    #[error("Refresh token does not match the active session")]
    RefreshTokenMismatch,
    #[error("Session store unavailable")]
    StoreUnavailable,
    #[error("An account with this email already exists")]
    DuplicateIdentifier,
    #[error("{0}")]
    InvalidInput(String),
    #[error("Internal error")]
    Internal,
}

impl AuthError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidCredential => "INVALID_CREDENTIAL",
            AuthError::InvalidRefreshToken => "INVALID_REFRESH_TOKEN",
            AuthError::InvalidAccessToken => "INVALID_ACCESS_TOKEN",
            AuthError::SessionNotFound => "SESSION_NOT_FOUND",
            AuthError::RefreshTokenMismatch => "REFRESH_TOKEN_MISMATCH",
            AuthError::StoreUnavailable => "STORE_UNAVAILABLE",
            AuthError::DuplicateIdentifier => "DUPLICATE_IDENTIFIER",
            AuthError::InvalidInput(_) => "INVALID_INPUT",
            AuthError::Internal => "INTERNAL",
        }
    }

    /// Only infrastructure failures are worth retrying, with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::StoreUnavailable)
    }
}

/// Access and refresh token issued together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token expiry (Unix seconds)
    pub access_token_expires_at: u64,
}

pub struct AuthService {
    codec: Arc<TokenCodec>,
    refresh: Arc<dyn RefreshStore>,
    users: Arc<dyn UserDirectory>,
    verifier: Arc<dyn CredentialVerifier>,
    store_timeout: Duration,
}

impl AuthService {
    pub fn new(
        codec: Arc<TokenCodec>,
        refresh: Arc<dyn RefreshStore>,
        users: Arc<dyn UserDirectory>,
        verifier: Arc<dyn CredentialVerifier>,
    ) -> Self {
        if !refresh.atomic_replace() {
            warn!(
                "Refresh store has no conditional update; concurrent reissues of one refresh token may both succeed"
            );
        }
        Self {
            codec,
            refresh,
            users,
            verifier,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Verify credentials and start a new session, replacing any previous one.
    pub async fn login(&self, identifier: &str, secret: &str) -> Result<TokenPair, AuthError> {
        let user = self
            .bounded("look up user", self.users.find_by_identifier(identifier))
            .await?;

        let verifier = self.verifier.clone();
        let secret = secret.to_string();
        let (user, valid) = tokio::task::spawn_blocking(move || match user {
            Some(user) => {
                let valid = verifier.verify(&secret, &user.password_hash);
                (Some(user), valid)
            }
            None => {
                verifier.verify_dummy(&secret);
                (None, false)
            }
        })
        .await
        .map_err(|e| {
            error!(error = %e, "Password verification task failed");
            AuthError::Internal
        })?;

        let user = match user {
            Some(user) if valid => user,
            _ => {
                warn!("Login failed: invalid credentials");
                return Err(AuthError::InvalidCredential);
            }
        };

        let pair = self.issue_pair(&user.subject, user.role)?;
        self.bounded("store refresh token", self.refresh.put(&user.subject, &pair.refresh_token))
            .await?;

        info!(subject = %user.subject, "Login succeeded");
        Ok(pair)
    }

    /// Exchange a refresh token (and the access token it was issued with)
    /// for a new pair, invalidating the refresh token presented.
    pub async fn reissue(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<TokenPair, AuthError> {
        match self.codec.verify(refresh_token) {
            Ok(claims) if claims.kind == TokenKind::Refresh => {}
            Ok(_) => {
                warn!("Reissue rejected: access token presented as refresh token");
                return Err(AuthError::InvalidRefreshToken);
            }
            Err(e) => {
                warn!(error = %e, "Reissue rejected: refresh token failed verification");
                return Err(AuthError::InvalidRefreshToken);
            }
        }

        // The access token is expected to be expired here; only its signature matters.
        let access = self
            .codec
            .verify_ignoring_expiry(access_token)
            .map_err(|e| {
                warn!(error = %e, "Reissue rejected: access token failed verification");
                AuthError::InvalidAccessToken
            })?;
        let role = match (access.kind, access.role) {
            (TokenKind::Access, Some(role)) => role,
            _ => {
                warn!("Reissue rejected: not an access token");
                return Err(AuthError::InvalidAccessToken);
            }
        };
        let subject = access.sub;

        let stored = self
            .bounded("read refresh token", self.refresh.get(&subject))
            .await?
            .ok_or_else(|| {
                warn!(subject = %subject, "Reissue rejected: no active session");
                AuthError::SessionNotFound
            })?;

        if stored != refresh_token {
            warn!(subject = %subject, "Reissue rejected: refresh token does not match session");
            return Err(AuthError::RefreshTokenMismatch);
        }

        let pair = self.issue_pair(&subject, role)?;
        let swapped = self
            .bounded(
                "rotate refresh token",
                self.refresh.replace(&subject, refresh_token, &pair.refresh_token),
            )
            .await?;
        if !swapped {
            warn!(subject = %subject, "Reissue rejected: refresh token rotated concurrently");
            return Err(AuthError::RefreshTokenMismatch);
        }

        debug!(subject = %subject, "Token pair reissued");
        Ok(pair)
    }

    /// Register a member with the `user` role. Returns the new subject.
    pub async fn signup(&self, email: &str, password: &str, name: &str) -> Result<String, AuthError> {
        let email = email.trim();
        let name = name.trim();

        if email.is_empty() || !email.contains('@') {
            return Err(AuthError::InvalidInput("A valid email is required".into()));
        }
        if password.len() < MIN_PASSWORD_LENGTH {
            return Err(AuthError::InvalidInput(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }
        if name.is_empty() {
            return Err(AuthError::InvalidInput("Name cannot be empty".into()));
        }

        let verifier = self.verifier.clone();
        let password = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || verifier.hash(&password))
            .await
            .map_err(|e| {
                error!(error = %e, "Password hashing task failed");
                AuthError::Internal
            })?
            .map_err(|e| {
                error!(error = %e, "Failed to hash password");
                AuthError::Internal
            })?;

        let subject = self
            .bounded(
                "create user",
                self.users.create(NewUser {
                    identifier: email,
                    password_hash: &password_hash,
                    name,
                    role: UserRole::User,
                }),
            )
            .await?
            .ok_or(AuthError::DuplicateIdentifier)?;

        info!(subject = %subject, "Member signed up");
        Ok(subject)
    }

    /// End the subject's session. Returns whether one was active.
    pub async fn logout(&self, subject: &str) -> Result<bool, AuthError> {
        let removed = self
            .bounded("remove refresh token", self.refresh.remove(subject))
            .await?;
        info!(subject = %subject, removed, "Logout");
        Ok(removed)
    }

    fn issue_pair(&self, subject: &str, role: UserRole) -> Result<TokenPair, AuthError> {
        let sign = |kind| {
            self.codec.sign(subject, role, kind).map_err(|e| {
                error!(error = %e, "Failed to sign token");
                AuthError::Internal
            })
        };
        let access = sign(TokenKind::Access)?;
        let refresh = sign(TokenKind::Refresh)?;

        Ok(TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
            access_token_expires_at: access.expires_at,
        })
    }

    /// Run a store call under the store timeout.
    async fn bounded<T>(
        &self,
        what: &'static str,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, AuthError> {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                error!(operation = what, error = %e, "Store call failed");
                Err(AuthError::StoreUnavailable)
            }
            Err(_) => {
                error!(operation = what, timeout = ?self.store_timeout, "Store call timed out");
                Err(AuthError::StoreUnavailable)
            }
        }
    }
}
