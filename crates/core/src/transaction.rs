use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::learning::LearningRecord;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("Date is not in YYYY/MM/DD form: {0}")]
    InvalidDate(String),
    #[error("Merchant must not be empty")]
    EmptyMerchant,
    #[error("Amount must be positive, got {0}")]
    NonPositiveAmount(i64),
}

/// One accepted statement row. Fields are fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedTransaction {
    date: String,
    merchant: String,
    amount: i64,
}

impl NormalizedTransaction {
    pub fn new(
        date: impl Into<String>,
        merchant: &str,
        amount: i64,
    ) -> Result<NormalizedTransaction, RecordError> {
        let date = date.into();
        if !is_canonical_date(&date) {
            return Err(RecordError::InvalidDate(date));
        }
        let merchant = merchant.trim();
        if merchant.is_empty() {
            return Err(RecordError::EmptyMerchant);
        }
        if amount <= 0 {
            return Err(RecordError::NonPositiveAmount(amount));
        }
        Ok(NormalizedTransaction {
            date,
            merchant: merchant.to_string(),
            amount,
        })
    }

    pub fn date(&self) -> &str {
        &self.date
    }

    pub fn merchant(&self) -> &str {
        &self.merchant
    }

    pub fn amount(&self) -> i64 {
        self.amount
    }
}

/// `YYYY/MM/DD` with ASCII digits only.
fn is_canonical_date(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 10
        && b[4] == b'/'
        && b[7] == b'/'
        && b.iter()
            .enumerate()
            .all(|(i, c)| i == 4 || i == 7 || c.is_ascii_digit())
}

/// Which step of the classifier cascade produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationTier {
    Learned,
    Rule,
    Amount,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub category: String,
    pub confidence: f32,
    pub memo: String,
    pub tier: ClassificationTier,
    /// The learning record that decided a learned-tier result.
    pub learning_record: Option<LearningRecord>,
}

/// Review bands used to flag guesses that need a human look.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    pub fn from_score(score: f32) -> Self {
        if score >= 0.8 {
            ConfidenceLevel::High
        } else if score >= 0.6 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

impl std::fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfidenceLevel::Low => write!(f, "low"),
            ConfidenceLevel::Medium => write!(f, "medium"),
            ConfidenceLevel::High => write!(f, "high"),
        }
    }
}

/// Application-level record: a classified row the user can edit and confirm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub date: String,
    pub merchant: String,
    pub amount: i64,
    pub category: Option<String>,
    pub memo: Option<String>,
    pub confidence: f32,
    #[serde(default)]
    pub is_confirmed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Builds the record for the `index`-th row of an ingestion batch.
    pub fn classified(
        index: usize,
        txn: &NormalizedTransaction,
        result: ClassificationResult,
        now: DateTime<Utc>,
    ) -> Self {
        Transaction {
            id: format!("transaction-{index}"),
            date: txn.date.clone(),
            merchant: txn.merchant.clone(),
            amount: txn.amount,
            category: Some(result.category),
            memo: Some(result.memo),
            confidence: result.confidence.clamp(0.0, 1.0),
            is_confirmed: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// A user-chosen category is fully trusted.
    pub fn set_category(&mut self, code: &str, memo: String, now: DateTime<Utc>) {
        self.category = Some(code.to_string());
        self.memo = Some(memo);
        self.confidence = 1.0;
        self.updated_at = now;
    }

    pub fn set_memo(&mut self, memo: String, now: DateTime<Utc>) {
        self.memo = Some(memo);
        self.updated_at = now;
    }

    /// Replaces the memo with a fresh one for the current category.
    /// Returns `false` and leaves the record untouched when no category is set.
    pub fn regenerate_memo<F>(&mut self, generate: F, now: DateTime<Utc>) -> bool
    where
        F: FnOnce(&str, i64) -> String,
    {
        let Some(category) = self.category.as_deref() else {
            return false;
        };
        self.memo = Some(generate(category, self.amount));
        self.updated_at = now;
        true
    }

    pub fn confirm(&mut self, now: DateTime<Utc>) {
        self.is_confirmed = true;
        self.updated_at = now;
    }

    pub fn confidence_level(&self) -> ConfidenceLevel {
        ConfidenceLevel::from_score(self.confidence)
    }
}
