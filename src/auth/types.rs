//! Request-scoped identity.

use crate::db::UserRole;

/// Identity established from a verified, unexpired access token.
/// Only the authentication middleware inserts it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedIdentity {
    /// User UUID
    pub subject: String,
    pub role: UserRole,
}
