//! Database module providing PostgreSQL connection pooling and the store
//! abstraction the auth services are built on.
//!
//! This module manages the database connection pool using sqlx and bundles the
//! repository implementations into a [`Store`].

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::Arc;
use std::time::Duration;

pub mod config;
pub mod errors;
pub mod memory;
pub mod repository;
pub mod timeouts;

pub use config::DatabaseConfig;
pub use errors::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use repository::{
    BlacklistRepository, PgBlacklistRepository, PgResetLedger, PgUserRepository, ResetLedger,
    ResetOutcome, UserRepository,
};

/// Database connection pool wrapper
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool
    ///
    /// # Arguments
    ///
    /// * `config` - Database configuration
    ///
    /// # Returns
    ///
    /// * `Result<Database, sqlx::Error>` - Database instance or error
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use recipe_auth::db::{Database, DatabaseConfig};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), sqlx::Error> {
    ///     let config = DatabaseConfig::from_env();
    ///     let db = Database::new(&config).await?;
    ///     Ok(())
    /// }
    /// ```
    pub async fn new(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the bundled schema migrations
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    /// Check if the database connection is healthy
    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Close the database connection pool
    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// Repository handles shared by the auth services
#[derive(Clone)]
pub struct Store {
    pub users: Arc<dyn UserRepository>,
    pub blacklist: Arc<dyn BlacklistRepository>,
    pub resets: Arc<dyn ResetLedger>,
}

impl Store {
    /// PostgreSQL-backed store over one pool
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            users: Arc::new(PgUserRepository::new(pool.clone())),
            blacklist: Arc::new(PgBlacklistRepository::new(pool.clone())),
            resets: Arc::new(PgResetLedger::new(pool)),
        }
    }

    /// Fresh, empty in-memory store
    pub fn memory() -> Self {
        Self::from_memory(Arc::new(MemoryStore::new()))
    }

    /// Store backed by an existing in-memory store, so callers keep a handle to it
    pub fn from_memory(memory: Arc<MemoryStore>) -> Self {
        Self {
            users: memory.clone(),
            blacklist: memory.clone(),
            resets: memory,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires a running PostgreSQL instance"]
    async fn test_database_connection() {
        // Use DATABASE_URL environment variable or default test database
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://postgres@localhost/recipes_test".to_string());

        let config = DatabaseConfig {
            database_url,
            max_connections: 5,
            min_connections: 1,
            connection_timeout_secs: 5,
            idle_timeout_secs: 300,
            max_lifetime_secs: 1800,
        };

        let db = Database::new(&config)
            .await
            .expect("Failed to connect to database");
        db.migrate().await.expect("Migrations failed");
        db.health_check().await.expect("Health check failed");
        db.close().await;
    }

    #[tokio::test]
    async fn test_memory_store_shares_state_across_handles() {
        let memory = Arc::new(MemoryStore::new());
        let store = Store::from_memory(memory.clone());

        let user = crate::auth::NewUser {
            id: uuid::Uuid::new_v4(),
            name: "Cook".to_string(),
            email: "cook@example.com".to_string(),
            password_hash: "hash".to_string(),
        };
        store.users.create_user(&user).await.unwrap();

        assert_eq!(memory.password_hash(user.id).await.as_deref(), Some("hash"));
    }
}
