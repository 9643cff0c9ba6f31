use chrono::Utc;
use keihi_core::{
    find_learned, LearnedConfidence, LearningRecord, LearningStats, MerchantDetail,
};
use tokio::sync::Mutex;

use crate::repository::{LearningRepository, StoreError};

/// Cached view over a [`LearningRepository`]. Reads are served from memory;
/// every upsert is written through.
pub struct LearningStore<R> {
    repo: R,
    records: Mutex<Vec<LearningRecord>>,
    curve: LearnedConfidence,
}

impl<R: LearningRepository> LearningStore<R> {
    /// Loads every record up front. An unreadable backend yields an empty
    /// store rather than an error.
    pub async fn open(repo: R) -> Self {
        let records = match repo.all().await {
            Ok(records) => {
                tracing::debug!(count = records.len(), "loaded learning records");
                records
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not load learning records, starting empty");
                Vec::new()
            }
        };
        Self {
            repo,
            records: Mutex::new(records),
            curve: LearnedConfidence::default(),
        }
    }

    pub fn with_curve(mut self, curve: LearnedConfidence) -> Self {
        self.curve = curve;
        self
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Records one confirmation of `merchant` as `category`. Upserts are
    /// serialized; a failed write is logged and the cached record is still
    /// returned.
    pub async fn upsert(
        &self,
        merchant: &str,
        category: &str,
        memo: Option<&str>,
    ) -> Result<LearningRecord, StoreError> {
        if merchant.trim().is_empty() {
            return Err(StoreError::EmptyMerchant);
        }

        let mut records = self.records.lock().await;
        let now = Utc::now();
        let record = match records.iter_mut().find(|r| r.is_same_merchant(merchant)) {
            Some(existing) => {
                existing.reinforce(category, memo, now);
                existing.clone()
            }
            None => {
                let fresh = LearningRecord::new(merchant, category, memo, now);
                records.push(fresh.clone());
                fresh
            }
        };

        if let Err(e) = self.repo.put(&record).await {
            tracing::warn!(merchant = %record.merchant, error = %e, "failed to persist learning record");
        }
        Ok(record)
    }

    /// Classification-style lookup: case-insensitive containment either way.
    pub async fn lookup(&self, merchant: &str) -> Option<LearningRecord> {
        let records = self.records.lock().await;
        find_learned(&records, merchant).cloned()
    }

    pub async fn snapshot(&self) -> Vec<LearningRecord> {
        self.records.lock().await.clone()
    }

    pub async fn stats(&self) -> LearningStats {
        LearningStats::from_records(&self.records.lock().await)
    }

    /// The record stored under exactly this merchant, ignoring case.
    pub async fn get(&self, merchant: &str) -> Option<LearningRecord> {
        let records = self.records.lock().await;
        records.iter().find(|r| r.is_same_merchant(merchant)).cloned()
    }

    pub async fn detail(&self, merchant: &str) -> Option<MerchantDetail> {
        self.get(merchant)
            .await
            .map(|r| MerchantDetail::from_record(&r, &self.curve))
    }

    pub async fn history_line(&self, merchant: &str) -> Option<String> {
        self.get(merchant).await.map(|r| r.history_line())
    }

    /// Memos previously confirmed for exactly this merchant.
    pub async fn memo_suggestions(&self, merchant: &str) -> Vec<String> {
        self.get(merchant)
            .await
            .and_then(|r| r.last_memo)
            .into_iter()
            .collect()
    }
}
