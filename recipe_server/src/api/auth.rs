//! Authentication API handlers.
//!
//! All endpoints take and return JSON. Failures carry an `{"error": ...}` body.
//!
//! # Examples
//!
//! Register a new user:
//! ```bash
//! curl -X POST http://localhost:8080/auth/register \
//!   -H "Content-Type: application/json" \
//!   -d '{"name": "Julia", "email": "julia@example.com", "password": "souffle"}'
//! ```
//!
//! Login:
//! ```bash
//! curl -X POST http://localhost:8080/auth/login \
//!   -H "Content-Type: application/json" \
//!   -d '{"email": "julia@example.com", "password": "souffle"}'
//! ```

use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
};
use chrono::{DateTime, Utc};
use recipe_auth::{
    AuthError, AuthenticatedUser,
    auth::{
        LoginRequest, PasswordResetConfirm, PasswordResetRequest, ProfileUpdate, RegisterRequest,
        ResetDispatch, User, bearer_token,
    },
};
use serde::Serialize;
use serde_json::{Value, json};

use super::{ApiError, AppState, rate_limiter::ClientAddr, request_id::RequestId};
use crate::logging::log_security_event;

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user_id: String,
    pub name: String,
    pub email: String,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id.to_string(),
            name: user.name.clone(),
            email: user.email.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub success: bool,
    pub message: String,
    pub data: UserResponse,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub data: UserResponse,
}

/// Unwrap a JSON body, turning a rejection into `400 Bad Request`
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| {
            ApiError(AuthError::InvalidInput(rejection.body_text()))
        })
}

fn authorization(headers: &HeaderMap) -> ApiResult<Option<&str>> {
    headers
        .get(AUTHORIZATION)
        .map(|value| value.to_str().map_err(|_| ApiError(AuthError::MalformedHeader)))
        .transpose()
}

/// Register a new user account.
///
/// # Response
///
/// `201 Created` with the new user's id, name and email.
///
/// # Errors
///
/// - `400 Bad Request`: Missing fields, short password, invalid email
/// - `409 Conflict`: Email already registered
/// - `429 Too Many Requests`: More than 5 attempts per minute
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<RegisterResponse>)> {
    let request = body(payload)?;
    let user = state.sessions.register(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            success: true,
            message: "User created successfully".to_string(),
            data: UserResponse::from(&user),
        }),
    ))
}

/// Authenticate a user and issue a session token.
///
/// # Errors
///
/// - `401 Unauthorized`: Invalid email or password (the two are not distinguished)
/// - `429 Too Many Requests`: More than 5 attempts per minute
pub async fn login(
    State(state): State<AppState>,
    request_id: RequestId,
    Extension(client): Extension<ClientAddr>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<LoginResponse>> {
    let request = body(payload)?;

    match state.sessions.login(request).await {
        Ok((user, session)) => Ok(Json(LoginResponse {
            success: true,
            message: "Login success".to_string(),
            token: session.token,
            expires_at: session.expires_at,
            data: UserResponse::from(&user),
        })),
        Err(err @ AuthError::InvalidCredentials) => {
            log_security_event(
                "failed_login",
                None,
                client.0,
                &format!("Invalid credentials (request {})", request_id.as_str()),
            );
            Err(err.into())
        }
        Err(err) => Err(err.into()),
    }
}

/// Logout by blacklisting the bearer token.
///
/// Logging out twice with the same token succeeds both times.
///
/// # Errors
///
/// - `401 Unauthorized`: Missing or malformed header, token not issued by this server
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<Value>> {
    let token = bearer_token(authorization(&headers)?)?;

    match state.sessions.logout(token).await {
        Ok(()) => {}
        Err(err) if err.is_benign() => {
            tracing::debug!("Logout of an already blacklisted token");
        }
        Err(err) => return Err(err.into()),
    }

    Ok(Json(json!({ "message": "Logout successful, token blacklisted" })))
}

/// Request a password reset.
///
/// Outside development the token is emailed and never returned.
///
/// # Errors
///
/// - `404 Not Found`: No user has that email
/// - `502 Bad Gateway`: The email could not be sent
pub async fn forgot_password(
    State(state): State<AppState>,
    payload: Result<Json<PasswordResetRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let request = body(payload)?;

    match state.resets.request_reset(&request.email).await? {
        ResetDispatch::Token(token) => Ok(Json(json!({ "reset_token": token }))),
        ResetDispatch::Emailed => Ok(Json(json!({ "message": "Check your email for reset link" }))),
    }
}

/// Apply a password reset.
///
/// # Errors
///
/// - `400 Bad Request`: Invalid, expired or already used token; rejected password
/// - `404 Not Found`: The account no longer exists
pub async fn reset_password(
    State(state): State<AppState>,
    payload: Result<Json<PasswordResetConfirm>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let request = body(payload)?;
    state
        .resets
        .apply_reset(&request.token, &request.new_password)
        .await?;

    Ok(Json(json!({ "message": "Password reset successful" })))
}

/// Profile of the authenticated user.
pub async fn me(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> ApiResult<Json<Value>> {
    let profile = state.sessions.current_user(user.user_id).await?;
    Ok(Json(json!({ "success": true, "data": profile })))
}

/// Update profile fields of the authenticated user.
///
/// # Errors
///
/// - `400 Bad Request`: Empty name or invalid email
/// - `409 Conflict`: Email belongs to another user
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    payload: Result<Json<ProfileUpdate>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let update = body(payload)?;
    let profile = state.sessions.update_profile(user.user_id, update).await?;

    Ok(Json(json!({
        "success": true,
        "message": "profile updated successfully",
        "data": profile,
    })))
}
