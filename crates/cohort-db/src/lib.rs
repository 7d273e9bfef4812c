//! # cohort-db
//!
//! Storage layer for cohort.
//!
//! This crate provides:
//! - Connection pool management
//! - Read access to profiles and postings
//! - The embedding vector store over pgvector
//! - Notification dedup records
//! - An in-memory store implementing the same traits
//!
//! ## Example
//!
//! ```rust,ignore
//! use cohort_db::{Database, VectorStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/cohort").await?;
//!     db.init().await?;
//!     println!("{} embeddings stored", db.embeddings.count().await?);
//!     Ok(())
//! }
//! ```
pub mod embeddings;
pub mod entities;
pub mod memory;
pub mod notifications;
pub mod pool;

// Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

pub use cohort_core::*;

pub use embeddings::PgVectorStore;
pub use entities::PgEntityRepository;
pub use memory::MemoryStore;
pub use notifications::PgNotificationRepository;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};

use tracing::info;

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Profiles and postings.
    pub entities: PgEntityRepository,
    /// Embedding vectors.
    pub embeddings: PgVectorStore,
    /// Notification dedup records.
    pub notifications: PgNotificationRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            entities: PgEntityRepository::new(pool.clone()),
            embeddings: PgVectorStore::new(pool.clone()),
            notifications: PgNotificationRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Prepare the store for use.
    ///
    /// Loads the vector extension and, with the `migrations` feature, applies
    /// pending migrations. Must be called once before any job starts; nothing
    /// here runs as a side effect of connecting.
    pub async fn init(&self) -> Result<()> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        #[cfg(feature = "migrations")]
        self.migrate().await?;

        info!(
            subsystem = "db",
            component = "database",
            op = "init",
            "Database initialized"
        );
        Ok(())
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
