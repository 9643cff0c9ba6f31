use keihi_core::{LearningRecord, LearningStats};
use thiserror::Error;

use crate::db::SqliteRepository;
use crate::json::JsonFileRepository;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Learning file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Merchant must not be empty")]
    EmptyMerchant,
}

/// Keyed persistence for learning records. Keys compare case-insensitively;
/// `put` replaces whatever record has the same key.
#[allow(async_fn_in_trait)]
pub trait LearningRepository: Send + Sync {
    async fn get(&self, merchant: &str) -> Result<Option<LearningRecord>, StoreError>;

    async fn put(&self, record: &LearningRecord) -> Result<(), StoreError>;

    async fn all(&self) -> Result<Vec<LearningRecord>, StoreError>;

    async fn stats(&self) -> Result<LearningStats, StoreError> {
        Ok(LearningStats::from_records(&self.all().await?))
    }
}

/// Backend chosen at runtime from configuration.
pub enum AnyRepository {
    Json(JsonFileRepository),
    Sqlite(SqliteRepository),
}

impl LearningRepository for AnyRepository {
    async fn get(&self, merchant: &str) -> Result<Option<LearningRecord>, StoreError> {
        match self {
            AnyRepository::Json(r) => r.get(merchant).await,
            AnyRepository::Sqlite(r) => r.get(merchant).await,
        }
    }

    async fn put(&self, record: &LearningRecord) -> Result<(), StoreError> {
        match self {
            AnyRepository::Json(r) => r.put(record).await,
            AnyRepository::Sqlite(r) => r.put(record).await,
        }
    }

    async fn all(&self) -> Result<Vec<LearningRecord>, StoreError> {
        match self {
            AnyRepository::Json(r) => r.all().await,
            AnyRepository::Sqlite(r) => r.all().await,
        }
    }
}
