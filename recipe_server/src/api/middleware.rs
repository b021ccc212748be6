//! Authentication middleware for protected endpoints.
//!
//! Validates the `Authorization: Bearer <token>` header and injects the
//! [`AuthenticatedUser`] into request extensions for downstream handlers.
//!
//! # Extracting the user
//!
//! ```rust,no_run
//! use axum::extract::Extension;
//! use recipe_auth::AuthenticatedUser;
//!
//! async fn protected_handler(Extension(user): Extension<AuthenticatedUser>) -> String {
//!     format!("Authenticated as user {}", user.user_id)
//! }
//! # let _ = protected_handler;
//! ```

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use recipe_auth::{AuthError, auth::authorize_header};

use super::{ApiError, AppState};
use crate::logging::log_security_event;

/// Authentication middleware that validates session tokens.
///
/// # Behavior
///
/// - **Success**: Injects `AuthenticatedUser` into request extensions and calls the next handler
/// - **Missing or malformed header**: `401 Unauthorized`
/// - **Bad signature, expired or revoked token**: `401 Unauthorized`
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let header = match request.headers().get(AUTHORIZATION) {
        Some(value) => match value.to_str() {
            Ok(value) => Some(value),
            Err(_) => return ApiError(AuthError::MalformedHeader).into_response(),
        },
        None => None,
    };

    match authorize_header(&state.sessions, header).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(err) => {
            if matches!(err, AuthError::TokenRevoked | AuthError::InvalidSignature) {
                log_security_event("rejected_token", None, None, &err.to_string());
            }
            ApiError(err).into_response()
        }
    }
}
