//! `Authorization` header contract consumed by HTTP middleware.

use super::{
    errors::{AuthError, AuthResult},
    models::AuthenticatedUser,
    session::SessionManager,
};

/// Bearer scheme name, matched case-sensitively
pub const BEARER_SCHEME: &str = "Bearer";

/// Extract the token from an `Authorization` header value
///
/// The value must be exactly two space-separated parts, the first `Bearer`.
///
/// # Errors
///
/// * `AuthError::MissingHeader` - Header absent or empty
/// * `AuthError::MalformedHeader` - Anything other than `Bearer <token>`
pub fn bearer_token(header: Option<&str>) -> AuthResult<&str> {
    let value = match header {
        Some(value) if !value.is_empty() => value,
        _ => return Err(AuthError::MissingHeader),
    };

    let parts: Vec<&str> = value.split(' ').collect();
    match parts.as_slice() {
        [scheme, token] if *scheme == BEARER_SCHEME && !token.is_empty() => Ok(*token),
        _ => Err(AuthError::MalformedHeader),
    }
}

/// Resolve an `Authorization` header to the authenticated user
pub async fn authorize_header(
    sessions: &SessionManager,
    header: Option<&str>,
) -> AuthResult<AuthenticatedUser> {
    let token = bearer_token(header)?;
    sessions.authorize(token).await
}
