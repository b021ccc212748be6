//! # Recipe Auth
//!
//! Authentication and session lifecycle core for the recipe sharing backend.
//!
//! The crate covers everything between an HTTP handler and the database that
//! carries real invariants:
//!
//! - **Token codec**: HS256 signed session and password-reset tokens with typed claims
//! - **Sessions**: registration, credential verification, token issuance, logout
//!   via a token blacklist and request authorization
//! - **Password reset**: short-lived reset tokens delivered by email and consumed
//!   exactly once
//! - **Guard**: the `Authorization: Bearer <token>` contract used by the HTTP middleware
//!
//! ## Core Modules
//!
//! - [`auth`]: Services, claims, errors and configuration
//! - [`db`]: Connection pooling and the repository traits the services depend on
//! - [`mail`]: Outbound email delivery
//!
//! ## Example
//!
//! ```
//! use recipe_auth::auth::{AuthConfig, SessionManager};
//! use recipe_auth::db::Store;
//!
//! let config = AuthConfig::new(
//!     "a-session-secret-of-at-least-32-bytes!!",
//!     "a-reset-secret-of-at-least-32-bytes!!!!",
//! );
//! let sessions = SessionManager::new(&Store::memory(), &config).unwrap();
//! # let _ = sessions;
//! ```

/// Authentication services, claims and error taxonomy.
pub mod auth;

/// Database pool, repositories and in-memory store.
pub mod db;

/// Outbound email delivery.
pub mod mail;

pub use auth::{
    AuthConfig, AuthError, AuthResult, AuthenticatedUser, ResetManager, SessionManager,
};
pub use db::Store;
