//! In-memory store for tests and local development.
//!
//! All three repository traits share one lock, so every write is atomic with
//! respect to every other write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::errors::{StoreError, StoreResult};
use super::repository::{BlacklistRepository, ResetLedger, ResetOutcome, UserRepository};
use crate::auth::{BlacklistedToken, NewUser, ProfileUpdate, User, UserId};

#[derive(Debug, Clone)]
struct StoredUser {
    user: User,
    password_hash: String,
}

#[derive(Debug, Default)]
struct MemoryState {
    users: HashMap<UserId, StoredUser>,
    blacklist: HashMap<String, BlacklistedToken>,
    consumed_resets: HashMap<Uuid, DateTime<Utc>>,
}

impl MemoryState {
    fn email_taken(&self, email: &str, except: Option<UserId>) -> bool {
        self.users
            .values()
            .any(|stored| stored.user.email == email && Some(stored.user.id) != except)
    }
}

/// Process-local implementation of every repository trait
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blacklist entries, expired ones included
    pub async fn blacklist_len(&self) -> usize {
        self.state.read().await.blacklist.len()
    }

    /// Stored password hash for a user, if any
    pub async fn password_hash(&self, user_id: UserId) -> Option<String> {
        self.state
            .read()
            .await
            .users
            .get(&user_id)
            .map(|stored| stored.password_hash.clone())
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create_user(&self, user: &NewUser) -> StoreResult<User> {
        let mut state = self.state.write().await;
        if state.email_taken(&user.email, None) || state.users.contains_key(&user.id) {
            return Err(StoreError::UniqueViolation);
        }

        let now = Utc::now();
        let created = User {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            bio: None,
            avatar_url: None,
            banner_url: None,
            created_at: now,
            updated_at: now,
        };

        state.users.insert(
            user.id,
            StoredUser {
                user: created.clone(),
                password_hash: user.password_hash.clone(),
            },
        );

        Ok(created)
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|stored| stored.user.email == email)
            .map(|stored| stored.user.clone()))
    }

    async fn find_by_id(&self, user_id: UserId) -> StoreResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.get(&user_id).map(|stored| stored.user.clone()))
    }

    async fn find_credentials(&self, email: &str) -> StoreResult<Option<(User, String)>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|stored| stored.user.email == email)
            .map(|stored| (stored.user.clone(), stored.password_hash.clone())))
    }

    async fn update_profile(
        &self,
        user_id: UserId,
        update: &ProfileUpdate,
    ) -> StoreResult<Option<User>> {
        let mut state = self.state.write().await;

        if let Some(email) = &update.email {
            if state.email_taken(email, Some(user_id)) {
                return Err(StoreError::UniqueViolation);
            }
        }

        let Some(stored) = state.users.get_mut(&user_id) else {
            return Ok(None);
        };

        let user = &mut stored.user;
        if let Some(name) = &update.name {
            user.name = name.clone();
        }
        if let Some(email) = &update.email {
            user.email = email.clone();
        }
        if let Some(bio) = &update.bio {
            user.bio = Some(bio.clone());
        }
        if let Some(avatar_url) = &update.avatar_url {
            user.avatar_url = Some(avatar_url.clone());
        }
        if let Some(banner_url) = &update.banner_url {
            user.banner_url = Some(banner_url.clone());
        }
        user.updated_at = Utc::now();

        Ok(Some(user.clone()))
    }
}

#[async_trait]
impl BlacklistRepository for MemoryStore {
    async fn insert(&self, entry: &BlacklistedToken) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.blacklist.contains_key(&entry.token) {
            return Err(StoreError::UniqueViolation);
        }
        state.blacklist.insert(entry.token.clone(), entry.clone());
        Ok(())
    }

    async fn exists(&self, token: &str) -> StoreResult<bool> {
        let state = self.state.read().await;
        Ok(state
            .blacklist
            .get(token)
            .is_some_and(|entry| entry.expires_at > Utc::now()))
    }

    async fn purge_expired(&self) -> StoreResult<u64> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let before = state.blacklist.len();
        state.blacklist.retain(|_, entry| entry.expires_at > now);
        state.consumed_resets.retain(|_, expires_at| *expires_at > now);
        Ok((before - state.blacklist.len()) as u64)
    }
}

#[async_trait]
impl ResetLedger for MemoryStore {
    async fn consume_and_update_password(
        &self,
        token_id: Uuid,
        user_id: UserId,
        password_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<ResetOutcome> {
        let mut state = self.state.write().await;

        if state.consumed_resets.contains_key(&token_id) {
            return Ok(ResetOutcome::AlreadyConsumed);
        }

        let Some(stored) = state.users.get_mut(&user_id) else {
            return Ok(ResetOutcome::UserMissing);
        };

        stored.password_hash = password_hash.to_string();
        stored.user.updated_at = Utc::now();
        state.consumed_resets.insert(token_id, expires_at);

        Ok(ResetOutcome::Applied)
    }
}
