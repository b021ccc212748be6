//! Authentication error types.

use crate::auth::token::TokenError;
use crate::db::StoreError;
use crate::mail::MailError;
use thiserror::Error;

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// A user with this email is already registered
    #[error("User already exists")]
    AlreadyExists,

    /// Email and password do not match a registered user
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// User not found
    #[error("User not found")]
    NotFound,

    /// Token cannot be decoded
    #[error("Malformed token")]
    Malformed,

    /// Token signature does not match
    #[error("Invalid token signature")]
    InvalidSignature,

    /// Token is past its expiry
    #[error("Token expired")]
    Expired,

    /// Token was revoked by logout
    #[error("Token has been revoked")]
    TokenRevoked,

    /// Token is already on the blacklist
    #[error("Token already blacklisted")]
    AlreadyBlacklisted,

    /// Reset token is invalid, expired or already used
    #[error("Invalid or expired reset token")]
    InvalidOrExpired,

    /// No Authorization header on the request
    #[error("Authorization header missing")]
    MissingHeader,

    /// Authorization header is not `Bearer <token>`
    #[error("Invalid Authorization header format")]
    MalformedHeader,

    /// Request input failed validation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Password hashing failed
    #[error("Password hashing failed")]
    HashingFailed,

    /// Token could not be signed
    #[error("Could not create token")]
    Signing,

    /// Unusable configuration detected while constructing a service
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Persistence failure
    #[error("Store failure: {0}")]
    StoreFailure(#[from] StoreError),

    /// Email delivery failure
    #[error("Mail failure: {0}")]
    MailFailure(#[from] MailError),
}

impl AuthError {
    /// Get a client-safe error message that doesn't leak sensitive information
    ///
    /// Store, mail and configuration errors are sanitized to prevent information
    /// disclosure about the internal system structure.
    pub fn client_message(&self) -> String {
        match self {
            AuthError::StoreFailure(_) | AuthError::InvalidConfig(_) => {
                "Internal server error".to_string()
            }
            AuthError::MailFailure(_) => "Could not send email, please try again later".to_string(),
            AuthError::HashingFailed | AuthError::Signing => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }

    /// Whether an upstream caller may retry the same request
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::StoreFailure(_) | AuthError::MailFailure(_))
    }

    /// Whether the error describes a state the caller already wanted
    ///
    /// Logging out an already blacklisted token is the only such case.
    pub fn is_benign(&self) -> bool {
        matches!(self, AuthError::AlreadyBlacklisted)
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Malformed => AuthError::Malformed,
            TokenError::InvalidSignature => AuthError::InvalidSignature,
            TokenError::Expired => AuthError::Expired,
            TokenError::Encoding(_) | TokenError::LifetimeOutOfRange => AuthError::Signing,
        }
    }
}

/// Result type for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;
