//! Bearer token authentication with role-based access control.
//!
//! The `authenticate` middleware verifies the access token on every request
//! and stores the resulting identity in the request extensions. It never
//! rejects; handlers opt in to authentication through the `Auth` extractor.

mod bearer;
mod errors;
mod extractors;
mod pipeline;
mod types;

pub use bearer::{BearerScheme, DEFAULT_BEARER_SCHEME, extract_bearer};
pub use errors::ApiAuthError;
pub use extractors::{AdminOnly, AnyRole, Auth, RoleConstraint};
pub use pipeline::{PipelineState, authenticate, identify};
pub use types::AuthenticatedIdentity;
