//! HTTP API for the recipe backend's authentication endpoints.
//!
//! # Endpoints Overview
//!
//! ## Public
//! - `GET /health` - Server health status
//! - `POST /auth/register` - Register new user (rate limited)
//! - `POST /auth/login` - Login with email and password (rate limited)
//! - `POST /auth/logout` - Blacklist the bearer token
//! - `POST /auth/forgot-password` - Request a password reset
//! - `POST /auth/reset-password` - Apply a password reset
//!
//! ## Requires Authentication
//! - `GET /auth/me` - Current user profile
//! - `PUT /auth/profile` - Update profile fields
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use recipe_auth::{AuthConfig, db::Store, mail::MemoryMailer};
//! use recipe_server::api::{AppState, create_router};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuthConfig::new("s".repeat(32), "r".repeat(32));
//! let state = AppState::new(Store::memory(), Arc::new(MemoryMailer::new()), &config, None)?;
//!
//! let app = create_router(state, &[]);
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod middleware;
pub mod rate_limiter;
pub mod request_id;

use axum::{
    Router,
    extract::State,
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
};
use recipe_auth::{
    AuthConfig, AuthError, ResetManager, SessionManager,
    db::{Database, Store},
    mail::Mailer,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};

use rate_limiter::ClientRateLimiter;

/// Application state shared across all HTTP handlers.
///
/// Cloned for each request; every field is a shared handle.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub resets: Arc<ResetManager>,
    /// Present when running against PostgreSQL
    pub database: Option<Database>,
    pub credential_limiter: Arc<ClientRateLimiter>,
}

impl AppState {
    /// Build the services over `store`
    ///
    /// # Errors
    ///
    /// * `AuthError::InvalidConfig` - Hashing cost is unusable
    pub fn new(
        store: Store,
        mailer: Arc<dyn Mailer>,
        config: &AuthConfig,
        database: Option<Database>,
    ) -> Result<Self, AuthError> {
        Ok(Self {
            sessions: Arc::new(SessionManager::new(&store, config)?),
            resets: Arc::new(ResetManager::new(&store, mailer, config)?),
            database,
            credential_limiter: Arc::new(ClientRateLimiter::credentials()),
        })
    }

    /// Key credential rate limits on `x-forwarded-for`
    ///
    /// Enable only behind a reverse proxy that overwrites the header.
    pub fn with_trusted_proxy(mut self, trust_proxy_headers: bool) -> Self {
        self.credential_limiter = Arc::new(
            ClientRateLimiter::credentials().with_trusted_proxy(trust_proxy_headers),
        );
        self
    }
}

/// Create the API router with all endpoints and middleware.
///
/// An empty `cors_origins` list allows any origin.
pub fn create_router(state: AppState, cors_origins: &[String]) -> Router {
    let credential_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .layer(axum::middleware::from_fn_with_state(
            state.credential_limiter.clone(),
            rate_limiter::rate_limit_middleware,
        ));

    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/forgot-password", post(auth::forgot_password))
        .route("/auth/reset-password", post(auth::reset_password));

    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/auth/profile", put(auth::update_profile))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    Router::new()
        .merge(credential_routes)
        .merge(public_routes)
        .merge(protected_routes)
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::ORIGIN, header::CONTENT_TYPE, header::AUTHORIZATION])
        .expose_headers([header::CONTENT_LENGTH])
        .allow_credentials(true)
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns `200 OK` if the store is reachable, `503 Service Unavailable` otherwise.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let (backend, healthy) = match &state.database {
        Some(db) => ("postgres", db.health_check().await.is_ok()),
        None => ("memory", true),
    };

    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "store": { "backend": backend, "healthy": healthy },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}

/// Error response carrying an [`AuthError`]
#[derive(Debug)]
pub struct ApiError(pub AuthError);

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self(err)
    }
}

/// HTTP status for each error kind
pub fn status_for(err: &AuthError) -> StatusCode {
    match err {
        AuthError::InvalidInput(_) | AuthError::InvalidOrExpired => StatusCode::BAD_REQUEST,
        AuthError::InvalidCredentials
        | AuthError::Malformed
        | AuthError::InvalidSignature
        | AuthError::Expired
        | AuthError::TokenRevoked
        | AuthError::MissingHeader
        | AuthError::MalformedHeader => StatusCode::UNAUTHORIZED,
        AuthError::NotFound => StatusCode::NOT_FOUND,
        AuthError::AlreadyExists => StatusCode::CONFLICT,
        AuthError::AlreadyBlacklisted => StatusCode::OK,
        AuthError::MailFailure(_) => StatusCode::BAD_GATEWAY,
        AuthError::StoreFailure(_)
        | AuthError::HashingFailed
        | AuthError::Signing
        | AuthError::InvalidConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        }

        (status, Json(json!({ "error": self.0.client_message() }))).into_response()
    }
}
