//! Authentication configuration.
//!
//! Secrets are loaded once at process start and passed into the services at
//! construction time. Nothing here is global.

use chrono::Duration;

/// Minimum secret length accepted by [`AuthConfig::validate`]
pub const MIN_SECRET_LEN: usize = 32;

/// Default session token lifetime
pub const DEFAULT_SESSION_TTL_SECS: i64 = 60 * 60;

/// Default reset token lifetime
pub const DEFAULT_RESET_TTL_SECS: i64 = 30 * 60;

/// Longest lifetime accepted for either token kind (one year)
pub const MAX_TOKEN_TTL_SECS: i64 = 365 * 24 * 60 * 60;

/// How password reset tokens reach the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetDelivery {
    /// Send a reset link by email
    Email,
    /// Return the raw token to the caller (development only)
    ReturnToken,
}

impl ResetDelivery {
    /// Pick the delivery mode for an `APP_ENV` value
    ///
    /// Only the exact value `development` enables the token bypass.
    pub fn for_environment(app_env: Option<&str>) -> Self {
        match app_env {
            Some("development") => ResetDelivery::ReturnToken,
            _ => ResetDelivery::Email,
        }
    }
}

/// Authentication configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Signing secret for session tokens
    pub session_secret: String,

    /// Signing secret for password reset tokens
    pub reset_secret: String,

    /// Session token lifetime
    pub session_ttl: Duration,

    /// Reset token lifetime
    pub reset_ttl: Duration,

    /// Reset token delivery mode
    pub reset_delivery: ResetDelivery,

    /// Base URL the reset link points at (`{base}/reset-password?token=...`)
    pub reset_link_base: String,

    /// Server-side pepper appended to passwords before hashing
    pub password_pepper: String,

    /// Argon2 memory cost in KiB
    pub hash_memory_kib: u32,

    /// Argon2 iteration count
    pub hash_iterations: u32,
}

impl AuthConfig {
    /// Configuration with the default lifetimes and hashing cost
    pub fn new(session_secret: impl Into<String>, reset_secret: impl Into<String>) -> Self {
        Self {
            session_secret: session_secret.into(),
            reset_secret: reset_secret.into(),
            session_ttl: Duration::seconds(DEFAULT_SESSION_TTL_SECS),
            reset_ttl: Duration::seconds(DEFAULT_RESET_TTL_SECS),
            reset_delivery: ResetDelivery::Email,
            reset_link_base: "http://localhost:8080".to_string(),
            password_pepper: String::new(),
            hash_memory_kib: argon2::Params::DEFAULT_M_COST,
            hash_iterations: argon2::Params::DEFAULT_T_COST,
        }
    }

    /// Check the configuration before any service is built
    ///
    /// # Errors
    ///
    /// Returns a description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.session_secret.len() < MIN_SECRET_LEN {
            return Err(format!(
                "session secret must be at least {MIN_SECRET_LEN} bytes"
            ));
        }

        if self.reset_secret.len() < MIN_SECRET_LEN {
            return Err(format!("reset secret must be at least {MIN_SECRET_LEN} bytes"));
        }

        if self.session_secret == self.reset_secret {
            return Err("session and reset secrets must differ".to_string());
        }

        if self.session_ttl <= Duration::zero() || self.reset_ttl <= Duration::zero() {
            return Err("token lifetimes must be positive".to_string());
        }

        let max_ttl = Duration::seconds(MAX_TOKEN_TTL_SECS);
        if self.session_ttl > max_ttl || self.reset_ttl > max_ttl {
            return Err(format!(
                "token lifetimes must be at most {MAX_TOKEN_TTL_SECS} seconds"
            ));
        }

        argon2::Params::new(self.hash_memory_kib, self.hash_iterations, 1, None)
            .map_err(|e| format!("invalid password hashing cost: {e}"))?;

        Ok(())
    }
}
