//! Collaborators used by login and signup: user lookup and password hashing.

use async_trait::async_trait;
use std::sync::OnceLock;
use thiserror::Error;

use crate::db::UserRole;
use crate::refresh::StoreError;

/// Default bcrypt cost factor.
pub const DEFAULT_BCRYPT_COST: u32 = 12;

/// Plaintext behind the per-verifier dummy hash. Never a real password.
const DUMMY_SECRET: &str = "tokenkeep-dummy-secret";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("failed to hash password: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}

/// What login needs to know about a user.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub subject: String,
    pub password_hash: String,
    pub role: UserRole,
}

#[derive(Debug, Clone, Copy)]
pub struct NewUser<'a> {
    pub identifier: &'a str,
    pub password_hash: &'a str,
    pub name: &'a str,
    pub role: UserRole,
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Create a user and return its subject, or `None` if the identifier is taken.
    async fn create(&self, user: NewUser<'_>) -> Result<Option<String>, StoreError>;
}

/// One-way password check.
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, secret: &str, hash: &str) -> bool;

    fn hash(&self, secret: &str) -> Result<String, CredentialError>;

    /// Burn the same work as a real verification, for identifiers that do
    /// not exist. Must cost what `verify` costs against a hash from `hash`.
    fn verify_dummy(&self, secret: &str);
}

#[derive(Debug, Clone)]
pub struct BcryptVerifier {
    cost: u32,
    /// Hash of `DUMMY_SECRET` at `cost`, built on first use
    dummy: OnceLock<Option<String>>,
}

impl BcryptVerifier {
    pub fn new(cost: u32) -> Self {
        Self {
            cost,
            dummy: OnceLock::new(),
        }
    }

    fn dummy_hash(&self) -> Option<&str> {
        self.dummy
            .get_or_init(|| match bcrypt::hash(DUMMY_SECRET, self.cost) {
                Ok(hash) => Some(hash),
                Err(e) => {
                    tracing::error!(cost = self.cost, error = %e, "Failed to build dummy hash");
                    None
                }
            })
            .as_deref()
    }
}

impl Default for BcryptVerifier {
    fn default() -> Self {
        Self::new(DEFAULT_BCRYPT_COST)
    }
}

impl CredentialVerifier for BcryptVerifier {
    fn verify(&self, secret: &str, hash: &str) -> bool {
        bcrypt::verify(secret, hash).unwrap_or(false)
    }

    fn hash(&self, secret: &str) -> Result<String, CredentialError> {
        Ok(bcrypt::hash(secret, self.cost)?)
    }

    fn verify_dummy(&self, secret: &str) {
        if let Some(hash) = self.dummy_hash() {
            let _ = self.verify(secret, hash);
        }
    }
}
