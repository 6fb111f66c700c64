pub mod app_config;
pub mod backend;
pub mod database;
pub mod memory;
pub mod persistence;
pub mod redis_repo;
pub mod writer;

pub use backend::StorageBackend;
pub use database::SqliteStore;
pub use memory::MemoryStore;
pub use persistence::PersistenceLayer;
pub use redis_repo::RedisStore;
pub use writer::PersistenceHandle;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Storage tier unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
