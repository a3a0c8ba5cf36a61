//! `Authorization` header parsing.

use std::sync::Arc;

use axum::http::{HeaderMap, header::AUTHORIZATION};

pub const DEFAULT_BEARER_SCHEME: &str = "Bearer";

/// The configured scheme tag, placed in request extensions by the pipeline
/// so rejections can name it in `WWW-Authenticate`.
#[derive(Debug, Clone)]
pub struct BearerScheme(pub Arc<str>);

impl Default for BearerScheme {
    fn default() -> Self {
        Self(Arc::from(DEFAULT_BEARER_SCHEME))
    }
}

/// Extract the token from `Authorization: <scheme> <token>`.
///
/// The scheme is matched exactly, case and whitespace included, and must be
/// followed by a single space. Returns `None` for a missing header, a
/// non-UTF-8 value, a different scheme or an empty token.
pub fn extract_bearer<'a>(headers: &'a HeaderMap, scheme: &str) -> Option<&'a str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix(scheme)?.strip_prefix(' ')?;
    if token.is_empty() { None } else { Some(token) }
}
