use chrono::{DateTime, Utc};
use keihi_core::LearningRecord;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;

use crate::repository::{LearningRepository, StoreError};

pub type DbPool = Pool<Sqlite>;

type RecordRow = (String, String, i64, Option<String>, DateTime<Utc>);

pub async fn create_db(path: &Path) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory database. The connection is never recycled,
/// so the data lives as long as the pool.
pub async fn create_memory_db() -> Result<DbPool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS learning_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            merchant_key TEXT NOT NULL UNIQUE,
            merchant TEXT NOT NULL,
            category TEXT NOT NULL,
            frequency INTEGER NOT NULL DEFAULT 1,
            last_memo TEXT,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Unicode-aware lowercase; SQLite's own `lower()` only folds ASCII.
fn merchant_key(merchant: &str) -> String {
    merchant.trim().to_lowercase()
}

fn row_to_record(r: RecordRow) -> LearningRecord {
    LearningRecord {
        merchant: r.0,
        category: r.1,
        frequency: u32::try_from(r.2.max(0)).unwrap_or(u32::MAX),
        last_memo: r.3,
        updated_at: r.4,
    }
}

/// Learning records in a SQLite table, one row per merchant key.
#[derive(Debug, Clone)]
pub struct SqliteRepository {
    pool: DbPool,
}

impl SqliteRepository {
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        Ok(Self::from_pool(create_db(path).await?))
    }

    pub fn from_pool(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

impl LearningRepository for SqliteRepository {
    async fn get(&self, merchant: &str) -> Result<Option<LearningRecord>, StoreError> {
        let row = sqlx::query_as::<_, RecordRow>(
            "SELECT merchant, category, frequency, last_memo, updated_at FROM learning_records WHERE merchant_key = ?",
        )
        .bind(merchant_key(merchant))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_record))
    }

    async fn put(&self, record: &LearningRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO learning_records (merchant_key, merchant, category, frequency, last_memo, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(merchant_key) DO UPDATE SET
                merchant = excluded.merchant,
                category = excluded.category,
                frequency = excluded.frequency,
                last_memo = excluded.last_memo,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(merchant_key(&record.merchant))
        .bind(&record.merchant)
        .bind(&record.category)
        .bind(i64::from(record.frequency))
        .bind(&record.last_memo)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn all(&self) -> Result<Vec<LearningRecord>, StoreError> {
        let rows = sqlx::query_as::<_, RecordRow>(
            "SELECT merchant, category, frequency, last_memo, updated_at FROM learning_records ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_record).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(merchant: &str, category: &str, frequency: u32, memo: Option<&str>) -> LearningRecord {
        LearningRecord {
            merchant: merchant.to_string(),
            category: category.to_string(),
            frequency,
            last_memo: memo.map(str::to_string),
            updated_at: Utc.timestamp_opt(1_750_000_000, 0).unwrap(),
        }
    }

    async fn repo() -> SqliteRepository {
        SqliteRepository::from_pool(create_memory_db().await.unwrap())
    }

    #[tokio::test]
    async fn empty_table() {
        let repo = repo().await;
        assert!(repo.all().await.unwrap().is_empty());
        assert!(repo.get("ENEOS").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_and_get() {
        let repo = repo().await;
        let rec = record("ENEOS中央店", "723", 2, Some("給油"));
        repo.put(&rec).await.unwrap();
        assert_eq!(repo.get("eneos中央店").await.unwrap(), Some(rec));
    }

    #[tokio::test]
    async fn upsert_keeps_one_row_per_key() {
        let repo = repo().await;
        repo.put(&record("Amazon", "728", 1, None)).await.unwrap();
        repo.put(&record("Starbucks", "717", 1, None)).await.unwrap();
        repo.put(&record("AMAZON", "741", 2, Some("書籍"))).await.unwrap();

        let all = repo.all().await.unwrap();
        assert_eq!(all.len(), 2);
        // Insertion order survives the update.
        assert_eq!(all[0].merchant, "AMAZON");
        assert_eq!(all[0].category, "741");
        assert_eq!(all[0].last_memo.as_deref(), Some("書籍"));
        assert_eq!(all[1].merchant, "Starbucks");
    }

    #[tokio::test]
    async fn file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("learning.db");
        {
            let repo = SqliteRepository::open(&path).await.unwrap();
            repo.put(&record("新幹線", "722", 4, Some("出張"))).await.unwrap();
            repo.pool().close().await;
        }
        let repo = SqliteRepository::open(&path).await.unwrap();
        let got = repo.get("新幹線").await.unwrap().unwrap();
        assert_eq!(got.frequency, 4);
    }
}
