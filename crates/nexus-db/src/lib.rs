//! # nexus-db
//!
//! PostgreSQL + pgvector persistence layer for the nexus research assistant.
//!
//! This crate provides:
//! - Connection pool management
//! - `PgChunkStore`, the PostgreSQL implementation of the `ChunkStore` trait:
//!   transactional replace-on-reindex and filtered nearest-neighbour search
//!   over the chunk embeddings
//!
//! ## Example
//!
//! ```rust,ignore
//! use nexus_db::Database;
//! use nexus_core::{ChunkFilter, ChunkStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/nexus").await?;
//!     let filter = ChunkFilter::for_user(1);
//!     let hits = db.chunks.nearest(&query_vec, &filter, 5).await?;
//!     Ok(())
//! }
//! ```

pub mod chunks;
pub mod pool;

// Re-export core types
pub use nexus_core::*;

pub use chunks::PgChunkStore;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};

/// Combined database context.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Chunk store for the indexing/retrieval pipeline.
    pub chunks: PgChunkStore,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            chunks: PgChunkStore::new(pool.clone()),
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

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            chunks: PgChunkStore::new(self.pool.clone()),
            pool: self.pool.clone(),
        }
    }
}
