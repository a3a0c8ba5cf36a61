//! JWT token signing and verification.
//!
//! Two token kinds share one HS256 key:
//! - Access tokens: short-lived, carry the role claim, verified without storage
//! - Refresh tokens: long-lived, no role claim, checked against the refresh store
//!
//! Every token is valid for `iat <= now < exp` as measured by the codec's clock.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::db::UserRole;

/// Default access token lifetime: 30 minutes
pub const DEFAULT_ACCESS_TTL_SECS: u64 = 30 * 60;

/// Default refresh token lifetime: 7 days
pub const DEFAULT_REFRESH_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Upper bound for either lifetime: 10 years
pub const MAX_TOKEN_LIFETIME_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Token kind, embedded as the `typ` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims carried by both token kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user UUID)
    pub sub: String,
    /// Authority label, present on access tokens only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<UserRole>,
    #[serde(rename = "typ")]
    pub kind: TokenKind,
    /// Unique token ID, so two tokens signed in the same second still differ
    pub jti: String,
    /// Issued at (Unix seconds)
    pub iat: u64,
    /// Expiration time (Unix seconds)
    pub exp: u64,
}

/// Reasons a token can fail to sign or verify.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("token signature does not match")]
    BadSignature,
    #[error("token has expired")]
    Expired,
    #[error("token expiry does not fit in a timestamp")]
    ExpiryOverflow,
    #[error("failed to sign token: {0}")]
    Signing(jsonwebtoken::errors::Error),
}

/// Source of the current time in Unix seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

/// Clock that only moves when told to. Used to test expiry deterministically.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    pub fn new(now: u64) -> Self {
        Self(AtomicU64::new(now))
    }

    pub fn set(&self, now: u64) {
        self.0.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifetimeError {
    #[error("access token lifetime must be greater than zero")]
    ZeroAccess,
    #[error("refresh token lifetime ({refresh}s) must exceed access token lifetime ({access}s)")]
    RefreshNotLonger { access: u64, refresh: u64 },
    #[error("token lifetime {requested}s exceeds the maximum of {max}s")]
    TooLong { requested: u64, max: u64 },
}

/// Validated access/refresh lifetimes in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLifetimes {
    access: u64,
    refresh: u64,
}

impl TokenLifetimes {
    pub fn new(access: u64, refresh: u64) -> Result<Self, LifetimeError> {
        if access == 0 {
            return Err(LifetimeError::ZeroAccess);
        }
        if refresh <= access {
            return Err(LifetimeError::RefreshNotLonger { access, refresh });
        }
        if refresh > MAX_TOKEN_LIFETIME_SECS {
            return Err(LifetimeError::TooLong {
                requested: refresh,
                max: MAX_TOKEN_LIFETIME_SECS,
            });
        }
        Ok(Self { access, refresh })
    }

    pub fn access(&self) -> u64 {
        self.access
    }

    pub fn refresh(&self) -> u64 {
        self.refresh
    }

    fn of(&self, kind: TokenKind) -> u64 {
        match kind {
            TokenKind::Access => self.access,
            TokenKind::Refresh => self.refresh,
        }
    }
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access: DEFAULT_ACCESS_TTL_SECS,
            refresh: DEFAULT_REFRESH_TTL_SECS,
        }
    }
}

/// A freshly signed token together with its expiry.
#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
}

/// Signs and verifies tokens with a process-wide secret.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    lifetimes: TokenLifetimes,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    /// Create a codec using the wall clock.
    pub fn new(secret: &[u8], lifetimes: TokenLifetimes) -> Self {
        Self::with_clock(secret, lifetimes, Arc::new(SystemClock))
    }

    pub fn with_clock(secret: &[u8], lifetimes: TokenLifetimes, clock: Arc<dyn Clock>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            lifetimes,
            clock,
        }
    }

    pub fn lifetimes(&self) -> TokenLifetimes {
        self.lifetimes
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Sign a token of the given kind. The role is only embedded in access tokens.
    pub fn sign(
        &self,
        subject: &str,
        role: UserRole,
        kind: TokenKind,
    ) -> Result<SignedToken, TokenError> {
        let now = self.clock.now();
        let exp = now
            .checked_add(self.lifetimes.of(kind))
            .ok_or(TokenError::ExpiryOverflow)?;

        let claims = Claims {
            sub: subject.to_string(),
            role: match kind {
                TokenKind::Access => Some(role),
                TokenKind::Refresh => None,
            },
            kind,
            jti: uuid::Uuid::new_v4().to_string(),
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(TokenError::Signing)?;

        Ok(SignedToken {
            token,
            expires_at: exp,
        })
    }

    /// Verify signature and validity window, returning the claims.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = self.verify_ignoring_expiry(token)?;
        if self.clock.now() >= claims.exp {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    /// Verify the signature but accept a token past its expiry.
    /// Only reissue uses this, to recover the identity of an expired access token.
    pub fn verify_ignoring_expiry(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        // Expiry is checked against our own clock with an exclusive upper bound.
        validation.validate_exp = false;

        let token_data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    TokenError::BadSignature
                }
                _ => TokenError::Malformed,
            })?;

        let claims = token_data.claims;
        if claims.exp <= claims.iat || claims.iat > self.clock.now() {
            return Err(TokenError::Malformed);
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    const SECRET: &[u8] = b"test-secret-key-for-testing";
    const START: u64 = 1_700_000_000;

    fn codec_at(clock: Arc<ManualClock>) -> TokenCodec {
        TokenCodec::with_clock(SECRET, TokenLifetimes::new(300, 3600).unwrap(), clock)
    }

    #[test]
    fn test_sign_and_verify_access_token() {
        let clock = Arc::new(ManualClock::new(START));
        let codec = codec_at(clock);

        let signed = codec.sign("uuid-123", UserRole::Admin, TokenKind::Access).unwrap();
        assert_eq!(signed.expires_at, START + 300);

        let claims = codec.verify(&signed.token).unwrap();
        assert_eq!(claims.sub, "uuid-123");
        assert_eq!(claims.role, Some(UserRole::Admin));
        assert_eq!(claims.kind, TokenKind::Access);
        assert_eq!(claims.iat, START);
        assert_eq!(claims.exp, START + 300);
    }

    #[test]
    fn test_refresh_token_has_no_role() {
        let clock = Arc::new(ManualClock::new(START));
        let codec = codec_at(clock);

        let signed = codec.sign("uuid-123", UserRole::Admin, TokenKind::Refresh).unwrap();
        let claims = codec.verify(&signed.token).unwrap();

        assert_eq!(claims.kind, TokenKind::Refresh);
        assert_eq!(claims.role, None);
        assert_eq!(claims.exp, START + 3600);

        let payload = signed.token.split('.').nth(1).unwrap();
        let json = String::from_utf8(URL_SAFE_NO_PAD.decode(payload).unwrap()).unwrap();
        assert!(!json.contains("role"));
    }

    #[test]
    fn test_valid_until_one_second_before_expiry() {
        let clock = Arc::new(ManualClock::new(START));
        let codec = codec_at(clock.clone());
        let signed = codec.sign("uuid-123", UserRole::User, TokenKind::Access).unwrap();

        clock.set(START + 299);
        assert!(codec.verify(&signed.token).is_ok());
    }

    #[test]
    fn test_expired_exactly_at_exp() {
        let clock = Arc::new(ManualClock::new(START));
        let codec = codec_at(clock.clone());
        let signed = codec.sign("uuid-123", UserRole::User, TokenKind::Access).unwrap();

        clock.set(START + 300);
        assert!(matches!(codec.verify(&signed.token), Err(TokenError::Expired)));

        clock.advance(10_000);
        assert!(matches!(codec.verify(&signed.token), Err(TokenError::Expired)));
    }

    #[test]
    fn test_verify_ignoring_expiry_accepts_expired_token() {
        let clock = Arc::new(ManualClock::new(START));
        let codec = codec_at(clock.clone());
        let signed = codec.sign("uuid-123", UserRole::User, TokenKind::Access).unwrap();

        clock.advance(10_000);
        let claims = codec.verify_ignoring_expiry(&signed.token).unwrap();
        assert_eq!(claims.sub, "uuid-123");
    }

    #[test]
    fn test_tampered_payload_is_bad_signature() {
        let clock = Arc::new(ManualClock::new(START));
        let codec = codec_at(clock.clone());
        let signed = codec.sign("uuid-123", UserRole::User, TokenKind::Access).unwrap();

        let parts: Vec<&str> = signed.token.split('.').collect();
        let mut claims: Claims =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(parts[1]).unwrap()).unwrap();
        claims.role = Some(UserRole::Admin);
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
        let forged = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

        assert!(matches!(codec.verify(&forged), Err(TokenError::BadSignature)));

        // Still a signature failure once the forged expiry has passed
        clock.advance(10_000);
        assert!(matches!(codec.verify(&forged), Err(TokenError::BadSignature)));
    }

    #[test]
    fn test_wrong_secret_is_bad_signature() {
        let clock = Arc::new(ManualClock::new(START));
        let codec = codec_at(clock.clone());
        let other = TokenCodec::with_clock(b"secret-2", TokenLifetimes::default(), clock);

        let signed = other.sign("uuid-123", UserRole::User, TokenKind::Access).unwrap();
        assert!(matches!(codec.verify(&signed.token), Err(TokenError::BadSignature)));
    }

    #[test]
    fn test_unsigned_token_is_rejected() {
        let codec = codec_at(Arc::new(ManualClock::new(START)));
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(
            format!(
                r#"{{"sub":"x","role":"admin","typ":"access","jti":"j","iat":{},"exp":{}}}"#,
                START,
                START + 60
            )
            .as_bytes(),
        );
        let token = format!("{}.{}.", header, payload);

        assert!(codec.verify(&token).is_err());
    }

    #[test]
    fn test_garbage_is_malformed() {
        let codec = codec_at(Arc::new(ManualClock::new(START)));

        assert!(matches!(codec.verify("invalid-token"), Err(TokenError::Malformed)));
        assert!(matches!(codec.verify(""), Err(TokenError::Malformed)));
        assert!(matches!(codec.verify("a.b.c"), Err(TokenError::Malformed)));
    }

    #[test]
    fn test_token_from_the_future_is_malformed() {
        let clock = Arc::new(ManualClock::new(START + 1000));
        let codec = codec_at(clock.clone());
        let signed = codec.sign("uuid-123", UserRole::User, TokenKind::Access).unwrap();

        clock.set(START);
        assert!(matches!(codec.verify(&signed.token), Err(TokenError::Malformed)));
    }

    #[test]
    fn test_unique_jti_per_token() {
        let codec = codec_at(Arc::new(ManualClock::new(START)));

        let a = codec.sign("uuid-123", UserRole::User, TokenKind::Refresh).unwrap();
        let b = codec.sign("uuid-123", UserRole::User, TokenKind::Refresh).unwrap();

        assert_ne!(a.token, b.token, "Tokens signed in the same second must differ");
    }

    #[test]
    fn test_lifetimes_validation() {
        assert_eq!(TokenLifetimes::new(0, 10), Err(LifetimeError::ZeroAccess));
        assert_eq!(
            TokenLifetimes::new(60, 60),
            Err(LifetimeError::RefreshNotLonger {
                access: 60,
                refresh: 60
            })
        );
        let lifetimes = TokenLifetimes::new(60, 61).unwrap();
        assert_eq!(lifetimes.access(), 60);
        assert_eq!(lifetimes.refresh(), 61);
    }

    #[test]
    fn test_lifetimes_above_maximum_are_rejected() {
        assert_eq!(
            TokenLifetimes::new(60, u64::MAX),
            Err(LifetimeError::TooLong {
                requested: u64::MAX,
                max: MAX_TOKEN_LIFETIME_SECS
            })
        );
        assert!(TokenLifetimes::new(60, MAX_TOKEN_LIFETIME_SECS).is_ok());
    }

    #[test]
    fn test_sign_near_end_of_time_fails_cleanly() {
        let codec = codec_at(Arc::new(ManualClock::new(u64::MAX - 10)));

        assert!(matches!(
            codec.sign("uuid-123", UserRole::User, TokenKind::Access),
            Err(TokenError::ExpiryOverflow)
        ));
        assert!(matches!(
            codec.sign("uuid-123", UserRole::User, TokenKind::Refresh),
            Err(TokenError::ExpiryOverflow)
        ));
    }
}
