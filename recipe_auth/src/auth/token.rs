//! Signed token codec.
//!
//! Session and reset tokens are HS256 JWTs. Each token kind has its own fixed
//! claim structure; the codec stamps `iat`/`exp` at issuance and maps decoding
//! failures onto [`TokenError`].

use crate::auth::models::UserId;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use uuid::Uuid;

/// Token codec errors
#[derive(Debug, Error)]
pub enum TokenError {
    /// Token structure cannot be decoded
    #[error("Malformed token")]
    Malformed,

    /// Signature does not match the payload
    #[error("Invalid token signature")]
    InvalidSignature,

    /// Token is past its expiry
    #[error("Token expired")]
    Expired,

    /// Signing failed
    #[error("Token encoding failed: {0}")]
    Encoding(jsonwebtoken::errors::Error),

    /// Requested lifetime cannot be represented as an expiry timestamp
    #[error("Token lifetime out of range")]
    LifetimeOutOfRange,
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidSignature => TokenError::InvalidSignature,
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Malformed,
        }
    }
}

/// A decoded claim set that may carry an `exp` claim
pub trait Expiring: DeserializeOwned {
    /// Expiry in seconds since the epoch
    fn exp(&self) -> Option<i64>;
}

/// A claim set that carries its own validity window
pub trait Claims: Serialize + Expiring {
    /// Record the issuance and expiry timestamps (seconds since the epoch)
    fn stamp(&mut self, issued_at: i64, expires_at: i64);
}

/// Whether expiry is enforced while parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    /// Signature and expiry are both checked
    Enforce,
    /// Signature is checked, expiry and required claims are not
    IgnoreExpiry,
}

/// A freshly signed token together with the claims it carries
#[derive(Debug, Clone)]
pub struct Issued<C> {
    pub token: String,
    pub claims: C,
}

/// JWT claims for session tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: UserId,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: Uuid,
}

impl SessionClaims {
    /// Claims for `user_id` with a fresh token id
    pub fn new(user_id: UserId, email: impl Into<String>) -> Self {
        Self {
            sub: user_id,
            email: email.into(),
            iat: 0,
            exp: 0,
            jti: Uuid::new_v4(),
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl Expiring for SessionClaims {
    fn exp(&self) -> Option<i64> {
        Some(self.exp)
    }
}

impl Claims for SessionClaims {
    fn stamp(&mut self, issued_at: i64, expires_at: i64) {
        self.iat = issued_at;
        self.exp = expires_at;
    }
}

/// JWT claims for password reset tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetClaims {
    pub sub: UserId,
    #[serde(default)]
    pub reset: bool,
    pub iat: i64,
    pub exp: i64,
    pub jti: Uuid,
}

impl ResetClaims {
    pub fn new(user_id: UserId) -> Self {
        Self {
            sub: user_id,
            reset: true,
            iat: 0,
            exp: 0,
            jti: Uuid::new_v4(),
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl Expiring for ResetClaims {
    fn exp(&self) -> Option<i64> {
        Some(self.exp)
    }
}

impl Claims for ResetClaims {
    fn stamp(&mut self, issued_at: i64, expires_at: i64) {
        self.iat = issued_at;
        self.exp = expires_at;
    }
}

/// HS256 encoder/decoder bound to one secret
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenCodec {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    /// Sign `claims` with an expiry of `now + ttl`
    pub fn issue<C: Claims>(&self, mut claims: C, ttl: Duration) -> Result<Issued<C>, TokenError> {
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or(TokenError::LifetimeOutOfRange)?;
        claims.stamp(now.timestamp(), expires_at.timestamp());

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(TokenError::Encoding)?;

        Ok(Issued { token, claims })
    }

    /// Verify the signature of `token` and decode its claims
    ///
    /// The signature is always checked first, so a tampered token reports
    /// `InvalidSignature` even when it is also expired. Under
    /// `Validity::Enforce` a token is expired from the first instant of its
    /// `exp` second onwards.
    pub fn parse<C: Expiring>(&self, token: &str, validity: Validity) -> Result<C, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        if validity == Validity::IgnoreExpiry {
            validation.validate_exp = false;
            validation.required_spec_claims.clear();
        }

        let claims = decode::<C>(token, &self.decoding, &validation)?.claims;

        // jsonwebtoken only rejects once `exp < now`; blacklist entries and
        // consumed reset records lapse at `exp` itself.
        if validity == Validity::Enforce {
            match claims.exp() {
                Some(exp) if Utc::now().timestamp() < exp => {}
                _ => return Err(TokenError::Expired),
            }
        }

        Ok(claims)
    }
}
