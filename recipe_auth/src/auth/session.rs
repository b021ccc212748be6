//! Session service: registration, login, logout and request authorization.

use super::{
    config::AuthConfig,
    errors::{AuthError, AuthResult},
    models::{
        AuthenticatedUser, BlacklistedToken, LoginRequest, NewUser, ProfileUpdate,
        RegisterRequest, SessionToken, User, UserId, normalize_email,
    },
    password::{CredentialHasher, validate_email, validate_name, validate_password},
    token::{Expiring, SessionClaims, TokenCodec, Validity},
};
use crate::db::{BlacklistRepository, Store, StoreError, UserRepository};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

/// Blacklist lifetime for a revoked token that carries no expiry
const FALLBACK_REVOCATION_TTL_HOURS: i64 = 24;

/// The only claim logout needs; everything else is ignored
#[derive(Debug, Deserialize)]
struct RevocationClaims {
    exp: Option<i64>,
}

impl Expiring for RevocationClaims {
    fn exp(&self) -> Option<i64> {
        self.exp
    }
}

/// Session manager
#[derive(Clone)]
pub struct SessionManager {
    users: Arc<dyn UserRepository>,
    blacklist: Arc<dyn BlacklistRepository>,
    codec: TokenCodec,
    hasher: CredentialHasher,
    session_ttl: Duration,
}

impl SessionManager {
    /// Create a new session manager
    ///
    /// # Arguments
    ///
    /// * `store` - Repositories backing users and the token blacklist
    /// * `config` - Secrets, lifetimes and hashing cost
    ///
    /// # Errors
    ///
    /// * `AuthError::InvalidConfig` - Hashing cost is unusable
    pub fn new(store: &Store, config: &AuthConfig) -> AuthResult<Self> {
        Ok(Self {
            users: store.users.clone(),
            blacklist: store.blacklist.clone(),
            codec: TokenCodec::new(config.session_secret.as_bytes()),
            hasher: CredentialHasher::new(config)?,
            session_ttl: config.session_ttl,
        })
    }

    /// Register a new user
    ///
    /// # Errors
    ///
    /// * `AuthError::InvalidInput` - Name, email or password rejected
    /// * `AuthError::AlreadyExists` - Email already registered
    pub async fn register(&self, request: RegisterRequest) -> AuthResult<User> {
        let email = normalize_email(&request.email);
        validate_name(&request.name)?;
        validate_email(&email)?;
        validate_password(&request.password)?;

        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AuthError::AlreadyExists);
        }

        let new_user = NewUser {
            id: Uuid::new_v4(),
            name: request.name.trim().to_string(),
            email,
            password_hash: self.hasher.hash(&request.password)?,
        };

        // A concurrent registration can still win between the lookup and the insert.
        let user = match self.users.create_user(&new_user).await {
            Ok(user) => user,
            Err(StoreError::UniqueViolation) => return Err(AuthError::AlreadyExists),
            Err(e) => return Err(e.into()),
        };

        log::info!("Registered user {}", user.id);
        Ok(user)
    }

    /// Login a user
    ///
    /// Unknown email and wrong password are indistinguishable to the caller.
    ///
    /// # Errors
    ///
    /// * `AuthError::InvalidCredentials` - No user matches the credentials
    pub async fn login(&self, request: LoginRequest) -> AuthResult<(User, SessionToken)> {
        let email = normalize_email(&request.email);

        let Some((user, password_hash)) = self.users.find_credentials(&email).await? else {
            self.hasher.verify_decoy(&request.password);
            log::warn!("Login failed: invalid credentials");
            return Err(AuthError::InvalidCredentials);
        };

        if !self.hasher.verify(&request.password, &password_hash) {
            log::warn!("Login failed for user {}: invalid credentials", user.id);
            return Err(AuthError::InvalidCredentials);
        }

        let token = self.issue_session(&user)?;
        log::info!("User {} logged in", user.id);
        Ok((user, token))
    }

    /// Logout by blacklisting the presented token
    ///
    /// Expiry is not checked, so an expired token can still be revoked. The
    /// blacklist entry lives until the token's own expiry.
    ///
    /// # Errors
    ///
    /// * `AuthError::Malformed` - Token cannot be decoded
    /// * `AuthError::InvalidSignature` - Token was not issued by this service
    /// * `AuthError::AlreadyBlacklisted` - Token was already revoked; callers
    ///   should treat this as success
    pub async fn logout(&self, raw_token: &str) -> AuthResult<()> {
        let token = raw_token.trim();
        let claims: RevocationClaims = self.codec.parse(token, Validity::IgnoreExpiry)?;

        let now = Utc::now();
        let expires_at = claims
            .exp
            .and_then(|exp| DateTime::from_timestamp(exp, 0))
            .unwrap_or_else(|| now + Duration::hours(FALLBACK_REVOCATION_TTL_HOURS));

        let entry = BlacklistedToken {
            id: Uuid::new_v4(),
            token: token.to_string(),
            created_at: now,
            expires_at,
        };

        match self.blacklist.insert(&entry).await {
            Ok(()) => {
                log::info!("Session token blacklisted until {}", expires_at);
                Ok(())
            }
            Err(StoreError::UniqueViolation) => Err(AuthError::AlreadyBlacklisted),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether a token has been revoked and its revocation is still in force
    pub async fn is_blacklisted(&self, raw_token: &str) -> AuthResult<bool> {
        Ok(self.blacklist.exists(raw_token.trim()).await?)
    }

    /// Authorize a request token
    ///
    /// Checks, in order and stopping at the first failure: signature, expiry,
    /// blacklist.
    ///
    /// # Errors
    ///
    /// * `AuthError::Malformed` / `AuthError::InvalidSignature` - Not a token we issued
    /// * `AuthError::Expired` - Past its expiry
    /// * `AuthError::TokenRevoked` - Logged out
    pub async fn authorize(&self, raw_token: &str) -> AuthResult<AuthenticatedUser> {
        let token = raw_token.trim();
        let claims: SessionClaims = self.codec.parse(token, Validity::Enforce)?;

        if self.blacklist.exists(token).await? {
            return Err(AuthError::TokenRevoked);
        }

        Ok(AuthenticatedUser {
            user_id: claims.sub,
            claims,
        })
    }

    /// Fetch the profile of an authenticated user
    pub async fn current_user(&self, user_id: UserId) -> AuthResult<User> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::NotFound)
    }

    /// Update profile fields
    ///
    /// # Errors
    ///
    /// * `AuthError::InvalidInput` - Empty name or invalid email
    /// * `AuthError::AlreadyExists` - New email belongs to another user
    /// * `AuthError::NotFound` - User doesn't exist
    pub async fn update_profile(
        &self,
        user_id: UserId,
        mut update: ProfileUpdate,
    ) -> AuthResult<User> {
        if let Some(name) = update.name.as_mut() {
            validate_name(name)?;
            *name = name.trim().to_string();
        }

        if let Some(email) = update.email.as_mut() {
            *email = normalize_email(email);
            validate_email(email)?;
        }

        if update.is_empty() {
            return self.current_user(user_id).await;
        }

        match self.users.update_profile(user_id, &update).await {
            Ok(Some(user)) => {
                log::info!("Updated profile of user {}", user_id);
                Ok(user)
            }
            Ok(None) => Err(AuthError::NotFound),
            Err(StoreError::UniqueViolation) => Err(AuthError::AlreadyExists),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete blacklist entries whose tokens have expired anyway
    pub async fn purge_expired_revocations(&self) -> AuthResult<u64> {
        let removed = self.blacklist.purge_expired().await?;
        if removed > 0 {
            log::debug!("Purged {} expired blacklist entries", removed);
        }
        Ok(removed)
    }

    fn issue_session(&self, user: &User) -> AuthResult<SessionToken> {
        let issued = self
            .codec
            .issue(SessionClaims::new(user.id, user.email.clone()), self.session_ttl)?;

        Ok(SessionToken {
            token: issued.token,
            token_id: issued.claims.jti,
            expires_at: issued.claims.expires_at(),
        })
    }
}
