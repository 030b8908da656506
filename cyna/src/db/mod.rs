//! Storage for accounts, sessions and API tokens.
//!
//! Production runs on PostgreSQL through [`Database`] and [`PgAuthStore`];
//! tests and demos use [`MemoryAuthStore`]. The auth core only sees the
//! repository traits.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

pub mod config;
pub mod memory;
pub mod postgres;
pub mod repository;

pub use config::DatabaseConfig;
pub use memory::MemoryAuthStore;
pub use postgres::PgAuthStore;
pub use repository::{AccountRepository, ApiTokenRepository, AuthStore, SessionRepository};

/// Owned PostgreSQL pool backing the auth store and `/health`
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Open the pool with the limits from `config`
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use cyna::db::{Database, DatabaseConfig};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), sqlx::Error> {
    ///     let db = Database::new(&DatabaseConfig::development()).await?;
    ///     let store = db.auth_store();
    ///     # let _ = store;
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

        log::debug!(
            "Opened PostgreSQL pool ({}..={} connections)",
            config.min_connections,
            config.max_connections
        );
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Auth store sharing this pool
    pub fn auth_store(&self) -> PgAuthStore {
        PgAuthStore::new(self.pool.clone())
    }

    /// Round-trip a trivial query; used by `/health`
    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Drain and close every connection
    pub async fn close(self) {
        self.pool.close().await;
    }
}
