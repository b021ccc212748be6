//! Authentication module providing registration, login, logout and password reset.
//!
//! This module implements:
//! - Argon2id password hashing with server-side pepper
//! - HS256 session tokens (1-hour expiry) carrying a unique token id
//! - Logout through a token blacklist checked on every authorization
//! - Single-use password reset tokens (30-minute expiry) on a separate secret
//!
//! ## Example
//!
//! ```no_run
//! use recipe_auth::auth::{AuthConfig, LoginRequest, RegisterRequest, SessionManager};
//! use recipe_auth::db::{Database, Store};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::new(&Default::default()).await?;
//!     let config = AuthConfig::new(
//!         std::env::var("ACCESS_TOKEN_SECRET")?,
//!         std::env::var("ACCESS_TOKEN_RESET")?,
//!     );
//!     let sessions = SessionManager::new(&Store::postgres(db.pool().clone()), &config)?;
//!
//!     let user = sessions
//!         .register(RegisterRequest {
//!             name: "Julia".to_string(),
//!             email: "julia@example.com".to_string(),
//!             password: "boeuf-bourguignon".to_string(),
//!         })
//!         .await?;
//!
//!     let (_, session) = sessions
//!         .login(LoginRequest {
//!             email: user.email.clone(),
//!             password: "boeuf-bourguignon".to_string(),
//!         })
//!         .await?;
//!
//!     let identity = sessions.authorize(&session.token).await?;
//!     assert_eq!(identity.user_id, user.id);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod errors;
pub mod guard;
pub mod models;
pub mod password;
pub mod reset;
pub mod session;
pub mod token;

pub use config::{AuthConfig, ResetDelivery};
pub use errors::{AuthError, AuthResult};
pub use guard::{authorize_header, bearer_token};
pub use models::{
    AuthenticatedUser, BlacklistedToken, LoginRequest, NewUser, PasswordResetConfirm,
    PasswordResetRequest, ProfileUpdate, RegisterRequest, ResetDispatch, SessionToken, User,
    UserId,
};
pub use reset::ResetManager;
pub use session::SessionManager;
pub use token::{Expiring, ResetClaims, SessionClaims, TokenCodec, TokenError, Validity};
