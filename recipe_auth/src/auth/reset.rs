//! Password reset service.
//!
//! Reset tokens are self-contained signed credentials bound to one user. Each
//! carries a token id that is recorded when the token is used, so a token
//! changes a password at most once.

use super::{
    config::{AuthConfig, ResetDelivery},
    errors::{AuthError, AuthResult},
    models::{ResetDispatch, normalize_email},
    password::{CredentialHasher, validate_password},
    token::{ResetClaims, TokenCodec, Validity},
};
use crate::db::{ResetLedger, ResetOutcome, Store, UserRepository};
use crate::mail::Mailer;
use chrono::Duration;
use std::sync::Arc;

/// Subject line of the reset email
pub const RESET_EMAIL_SUBJECT: &str = "Reset Your Password";

/// Password reset manager
#[derive(Clone)]
pub struct ResetManager {
    users: Arc<dyn UserRepository>,
    ledger: Arc<dyn ResetLedger>,
    mailer: Arc<dyn Mailer>,
    codec: TokenCodec,
    hasher: CredentialHasher,
    reset_ttl: Duration,
    delivery: ResetDelivery,
    link_base: String,
}

impl ResetManager {
    /// Create a new reset manager
    ///
    /// # Errors
    ///
    /// * `AuthError::InvalidConfig` - Hashing cost is unusable
    pub fn new(store: &Store, mailer: Arc<dyn Mailer>, config: &AuthConfig) -> AuthResult<Self> {
        Ok(Self {
            users: store.users.clone(),
            ledger: store.resets.clone(),
            mailer,
            codec: TokenCodec::new(config.reset_secret.as_bytes()),
            hasher: CredentialHasher::new(config)?,
            reset_ttl: config.reset_ttl,
            delivery: config.reset_delivery,
            link_base: config.reset_link_base.trim_end_matches('/').to_string(),
        })
    }

    /// Issue a reset token for the account registered under `email`
    ///
    /// Earlier tokens for the same user stay valid until they expire or are used.
    ///
    /// # Returns
    ///
    /// * `ResetDispatch::Emailed` - Normal operation
    /// * `ResetDispatch::Token` - Development delivery, the raw token
    ///
    /// # Errors
    ///
    /// * `AuthError::NotFound` - No user has that email
    /// * `AuthError::MailFailure` - The email could not be sent
    pub async fn request_reset(&self, email: &str) -> AuthResult<ResetDispatch> {
        let email = normalize_email(email);
        let user = self
            .users
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::NotFound)?;

        let issued = self.codec.issue(ResetClaims::new(user.id), self.reset_ttl)?;

        match self.delivery {
            ResetDelivery::ReturnToken => {
                log::warn!(
                    "Development delivery: returning reset token for user {} to caller",
                    user.id
                );
                Ok(ResetDispatch::Token(issued.token))
            }
            ResetDelivery::Email => {
                let link = format!("{}/reset-password?token={}", self.link_base, issued.token);
                let body = format!(
                    "Follow this link to reset your password:\n\n{link}\n\nThe link expires in {} minutes.",
                    self.reset_ttl.num_minutes()
                );

                self.mailer.send(&user.email, RESET_EMAIL_SUBJECT, &body).await?;
                log::info!("Password reset email sent to user {}", user.id);
                Ok(ResetDispatch::Emailed)
            }
        }
    }

    /// Replace the password of the user a reset token is bound to
    ///
    /// No current-password check is made; holding the token is the authorization.
    ///
    /// # Errors
    ///
    /// * `AuthError::InvalidOrExpired` - Bad signature, missing reset marker,
    ///   expired, or already used
    /// * `AuthError::InvalidInput` - New password rejected
    /// * `AuthError::NotFound` - The bound user no longer exists
    pub async fn apply_reset(&self, token: &str, new_password: &str) -> AuthResult<()> {
        let claims: ResetClaims = self
            .codec
            .parse(token.trim(), Validity::Enforce)
            .map_err(|_| AuthError::InvalidOrExpired)?;

        if !claims.reset {
            return Err(AuthError::InvalidOrExpired);
        }

        validate_password(new_password)?;
        let password_hash = self.hasher.hash(new_password)?;

        let outcome = self
            .ledger
            .consume_and_update_password(claims.jti, claims.sub, &password_hash, claims.expires_at())
            .await?;

        match outcome {
            ResetOutcome::Applied => {
                log::info!("Password reset applied for user {}", claims.sub);
                Ok(())
            }
            ResetOutcome::AlreadyConsumed => {
                log::warn!("Reuse of consumed reset token for user {}", claims.sub);
                Err(AuthError::InvalidOrExpired)
            }
            ResetOutcome::UserMissing => Err(AuthError::NotFound),
        }
    }
}
