//! Repository trait definitions for testability and dependency injection.
//!
//! The services only see these traits. PostgreSQL implementations live here;
//! the in-memory implementation is in [`super::memory`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use super::errors::StoreResult;
use super::timeouts::{with_default_timeout, with_transaction_timeout};
use crate::auth::{BlacklistedToken, NewUser, ProfileUpdate, User, UserId};

/// Outcome of a reset-token consumption attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    /// Token recorded as used and password replaced
    Applied,
    /// Token id was already recorded; nothing changed
    AlreadyConsumed,
    /// The user the token is bound to no longer exists; nothing changed
    UserMissing,
}

/// Trait for user repository operations
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user in a single transaction (unique on email)
    async fn create_user(&self, user: &NewUser) -> StoreResult<User>;

    /// Find user by normalized email
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    /// Find user by ID
    async fn find_by_id(&self, user_id: UserId) -> StoreResult<Option<User>>;

    /// Find user and stored password hash by normalized email
    async fn find_credentials(&self, email: &str) -> StoreResult<Option<(User, String)>>;

    /// Apply a profile update; `None` if the user doesn't exist
    async fn update_profile(&self, user_id: UserId, update: &ProfileUpdate)
    -> StoreResult<Option<User>>;
}

/// Trait for revoked session token storage
#[async_trait]
pub trait BlacklistRepository: Send + Sync {
    /// Insert an entry (unique on token string)
    async fn insert(&self, entry: &BlacklistedToken) -> StoreResult<()>;

    /// Whether an unexpired entry exists for `token`
    async fn exists(&self, token: &str) -> StoreResult<bool>;

    /// Delete entries whose expiry has passed, returning how many were removed
    async fn purge_expired(&self) -> StoreResult<u64>;
}

/// Trait for single-use password reset bookkeeping
#[async_trait]
pub trait ResetLedger: Send + Sync {
    /// Record `token_id` as consumed and replace the user's password hash,
    /// atomically
    async fn consume_and_update_password(
        &self,
        token_id: Uuid,
        user_id: UserId,
        password_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<ResetOutcome>;
}

const USER_COLUMNS: &str =
    "id, name, email, bio, avatar_url, banner_url, created_at, updated_at";

fn user_from_row(row: &PgRow) -> User {
    User {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        bio: row.get("bio"),
        avatar_url: row.get("avatar_url"),
        banner_url: row.get("banner_url"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Replace a user's password hash inside an open transaction
///
/// Returns `false` if no user has `user_id`.
async fn update_password_in(
    tx: &mut Transaction<'_, Postgres>,
    user_id: UserId,
    password_hash: &str,
) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
            .bind(password_hash)
            .bind(user_id)
            .execute(&mut **tx)
            .await?;

    Ok(result.rows_affected() == 1)
}

/// PostgreSQL implementation of `UserRepository`
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create_user(&self, user: &NewUser) -> StoreResult<User> {
        let query = format!(
            "INSERT INTO users (id, name, email, password_hash) VALUES ($1, $2, $3, $4) \
             RETURNING {USER_COLUMNS}"
        );

        let row = with_transaction_timeout(async {
            let mut tx = self.pool.begin().await?;
            let row = sqlx::query(&query)
                .bind(user.id)
                .bind(&user.name)
                .bind(&user.email)
                .bind(&user.password_hash)
                .fetch_one(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok::<_, sqlx::Error>(row)
        })
        .await?;

        Ok(user_from_row(&row))
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let row = with_default_timeout(
            sqlx::query(&query).bind(email).fetch_optional(&self.pool),
        )
        .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    async fn find_by_id(&self, user_id: UserId) -> StoreResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = with_default_timeout(
            sqlx::query(&query).bind(user_id).fetch_optional(&self.pool),
        )
        .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    async fn find_credentials(&self, email: &str) -> StoreResult<Option<(User, String)>> {
        let query = format!("SELECT {USER_COLUMNS}, password_hash FROM users WHERE email = $1");
        let row = with_default_timeout(
            sqlx::query(&query).bind(email).fetch_optional(&self.pool),
        )
        .await?;

        Ok(row.map(|r| (user_from_row(&r), r.get("password_hash"))))
    }

    async fn update_profile(
        &self,
        user_id: UserId,
        update: &ProfileUpdate,
    ) -> StoreResult<Option<User>> {
        let query = format!(
            "UPDATE users SET
                name = COALESCE($2, name),
                email = COALESCE($3, email),
                bio = COALESCE($4, bio),
                avatar_url = COALESCE($5, avatar_url),
                banner_url = COALESCE($6, banner_url),
                updated_at = NOW()
             WHERE id = $1
             RETURNING {USER_COLUMNS}"
        );

        let row = with_transaction_timeout(async {
            let mut tx = self.pool.begin().await?;
            let row = sqlx::query(&query)
                .bind(user_id)
                .bind(&update.name)
                .bind(&update.email)
                .bind(&update.bio)
                .bind(&update.avatar_url)
                .bind(&update.banner_url)
                .fetch_optional(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok::<_, sqlx::Error>(row)
        })
        .await?;

        Ok(row.as_ref().map(user_from_row))
    }
}

/// PostgreSQL implementation of `BlacklistRepository`
#[derive(Clone)]
pub struct PgBlacklistRepository {
    pool: PgPool,
}

impl PgBlacklistRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BlacklistRepository for PgBlacklistRepository {
    async fn insert(&self, entry: &BlacklistedToken) -> StoreResult<()> {
        with_transaction_timeout(async {
            let mut tx = self.pool.begin().await?;
            sqlx::query(
                "INSERT INTO blacklisted_tokens (id, token, created_at, expires_at)
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(entry.id)
            .bind(&entry.token)
            .bind(entry.created_at)
            .bind(entry.expires_at)
            .execute(&mut *tx)
            .await?;
            tx.commit().await
        })
        .await
    }

    async fn exists(&self, token: &str) -> StoreResult<bool> {
        let row = with_default_timeout(
            sqlx::query(
                "SELECT 1 AS found FROM blacklisted_tokens WHERE token = $1 AND expires_at > NOW()",
            )
            .bind(token)
            .fetch_optional(&self.pool),
        )
        .await?;

        Ok(row.is_some())
    }

    async fn purge_expired(&self) -> StoreResult<u64> {
        let result = with_default_timeout(
            sqlx::query("DELETE FROM blacklisted_tokens WHERE expires_at <= NOW()")
                .execute(&self.pool),
        )
        .await?;

        // Expired reset tokens fail validation before the ledger is consulted.
        with_default_timeout(
            sqlx::query("DELETE FROM consumed_reset_tokens WHERE expires_at <= NOW()")
                .execute(&self.pool),
        )
        .await?;

        Ok(result.rows_affected())
    }
}

/// PostgreSQL implementation of `ResetLedger`
#[derive(Clone)]
pub struct PgResetLedger {
    pool: PgPool,
}

impl PgResetLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResetLedger for PgResetLedger {
    async fn consume_and_update_password(
        &self,
        token_id: Uuid,
        user_id: UserId,
        password_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<ResetOutcome> {
        with_transaction_timeout(async {
            let mut tx = self.pool.begin().await?;

            // Concurrent consumers of the same token serialize on the primary key.
            let recorded = sqlx::query(
                "INSERT INTO consumed_reset_tokens (token_id, user_id, expires_at)
                 VALUES ($1, $2, $3)
                 ON CONFLICT (token_id) DO NOTHING",
            )
            .bind(token_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&mut *tx)
            .await?;

            if recorded.rows_affected() == 0 {
                tx.rollback().await?;
                return Ok::<_, sqlx::Error>(ResetOutcome::AlreadyConsumed);
            }

            if !update_password_in(&mut tx, user_id, password_hash).await? {
                tx.rollback().await?;
                return Ok::<_, sqlx::Error>(ResetOutcome::UserMissing);
            }

            tx.commit().await?;
            Ok::<_, sqlx::Error>(ResetOutcome::Applied)
        })
        .await
    }
}
