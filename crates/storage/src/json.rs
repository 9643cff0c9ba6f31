use chrono::{DateTime, Utc};
use keihi_core::LearningRecord;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::repository::{LearningRepository, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    category: String,
    frequency: u32,
    #[serde(default)]
    last_memo: Option<String>,
    updated_at: DateTime<Utc>,
}

impl StoredEntry {
    fn from_record(record: &LearningRecord) -> Self {
        StoredEntry {
            category: record.category.clone(),
            frequency: record.frequency,
            last_memo: record.last_memo.clone(),
            updated_at: record.updated_at,
        }
    }

    fn to_record(&self, merchant: &str) -> LearningRecord {
        LearningRecord {
            merchant: merchant.to_string(),
            category: self.category.clone(),
            frequency: self.frequency,
            last_memo: self.last_memo.clone(),
            updated_at: self.updated_at,
        }
    }
}

/// Merchant name → history, as written to disk. Object keys keep the order
/// merchants were first learned in, which decides overlapping lookups.
#[derive(Debug, Default)]
struct StoredMap(Vec<(String, StoredEntry)>);

impl StoredMap {
    fn position(&self, merchant: &str) -> Option<usize> {
        let wanted = merchant.trim().to_lowercase();
        self.0.iter().position(|(k, _)| k.to_lowercase() == wanted)
    }

    /// Replaces a same-merchant entry in place, or appends.
    fn upsert(&mut self, record: &LearningRecord) {
        let entry = (record.merchant.clone(), StoredEntry::from_record(record));
        match self.position(&record.merchant) {
            Some(i) => self.0[i] = entry,
            None => self.0.push(entry),
        }
    }
}

impl Serialize for StoredMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (merchant, entry) in &self.0 {
            map.serialize_entry(merchant, entry)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for StoredMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = StoredMap;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of merchant names to learning entries")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<StoredMap, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((merchant, entry)) = access.next_entry::<String, StoredEntry>()? {
                    entries.push((merchant, entry));
                }
                Ok(StoredMap(entries))
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}

/// Learning records in one flat JSON object. The file is the source of
/// truth; every call re-reads it, so concurrent writers are last-writer-wins
/// per merchant.
#[derive(Debug, Clone)]
pub struct JsonFileRepository {
    path: PathBuf,
}

impl JsonFileRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<StoredMap, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(StoredMap::default()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoredMap::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, map: &StoredMap) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_vec_pretty(map)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

impl LearningRepository for JsonFileRepository {
    async fn get(&self, merchant: &str) -> Result<Option<LearningRecord>, StoreError> {
        let map = self.load().await?;
        Ok(map.position(merchant).map(|i| {
            let (k, e) = &map.0[i];
            e.to_record(k)
        }))
    }

    async fn put(&self, record: &LearningRecord) -> Result<(), StoreError> {
        let mut map = match self.load().await {
            Ok(map) => map,
            Err(StoreError::Json(e)) => {
                tracing::warn!(path = %self.path.display(), error = %e, "overwriting unreadable learning file");
                StoredMap::default()
            }
            Err(e) => return Err(e),
        };
        map.upsert(record);
        self.save(&map).await
    }

    /// Records in the order they were first learned.
    async fn all(&self) -> Result<Vec<LearningRecord>, StoreError> {
        let map = self.load().await?;
        Ok(map.0.iter().map(|(k, e)| e.to_record(k)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(merchant: &str, category: &str, frequency: u32) -> LearningRecord {
        LearningRecord {
            merchant: merchant.to_string(),
            category: category.to_string(),
            frequency,
            last_memo: Some("給油".to_string()),
            updated_at: Utc.timestamp_opt(1_750_000_000, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonFileRepository::new(dir.path().join("learning.json"));
        assert!(repo.all().await.unwrap().is_empty());
        assert!(repo.get("ENEOS").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_then_get_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonFileRepository::new(dir.path().join("nested").join("learning.json"));
        repo.put(&record("ENEOS", "723", 1)).await.unwrap();

        let got = repo.get("eneos").await.unwrap().unwrap();
        assert_eq!(got, record("ENEOS", "723", 1));
    }

    #[tokio::test]
    async fn put_replaces_same_key_ignoring_case() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonFileRepository::new(dir.path().join("learning.json"));
        repo.put(&record("Amazon", "728", 1)).await.unwrap();
        repo.put(&record("AMAZON", "741", 2)).await.unwrap();

        let all = repo.all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].merchant, "AMAZON");
        assert_eq!(all[0].frequency, 2);
    }

    #[tokio::test]
    async fn file_is_a_flat_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("learning.json");
        let repo = JsonFileRepository::new(&path);
        repo.put(&record("ENEOS", "723", 3)).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["ENEOS"]["category"], "723");
        assert_eq!(raw["ENEOS"]["frequency"], 3);
        assert_eq!(raw["ENEOS"]["last_memo"], "給油");
    }

    #[tokio::test]
    async fn file_order_is_learning_order() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonFileRepository::new(dir.path().join("learning.json"));
        repo.put(&record("ローソン", "717", 1)).await.unwrap();
        repo.put(&record("AMAZON MKT", "728", 1)).await.unwrap();
        repo.put(&record("Amazon", "741", 1)).await.unwrap();
        repo.put(&record("amazon mkt", "728", 2)).await.unwrap();

        let merchants: Vec<_> = repo
            .all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.merchant)
            .collect();
        assert_eq!(merchants, vec!["ローソン", "amazon mkt", "Amazon"]);
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("learning.json");
        std::fs::write(&path, "{not json").unwrap();
        let repo = JsonFileRepository::new(&path);
        assert!(matches!(repo.all().await, Err(StoreError::Json(_))));

        repo.put(&record("ENEOS", "723", 1)).await.unwrap();
        assert_eq!(repo.all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stats_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonFileRepository::new(dir.path().join("learning.json"));
        repo.put(&record("A", "717", 2)).await.unwrap();
        repo.put(&record("B", "723", 5)).await.unwrap();
        let stats = repo.stats().await.unwrap();
        assert_eq!(stats.total_merchants, 2);
        assert_eq!(stats.total_frequency, 7);
        assert_eq!(stats.most_learned[0].merchant, "B");
    }
}
