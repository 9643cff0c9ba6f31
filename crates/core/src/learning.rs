use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::category::category_name;

pub const STATS_TOP_N: usize = 5;

/// Accumulated confirmation history for one merchant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningRecord {
    pub merchant: String,
    pub category: String,
    pub frequency: u32,
    pub last_memo: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl LearningRecord {
    pub fn new(merchant: &str, category: &str, memo: Option<&str>, now: DateTime<Utc>) -> Self {
        LearningRecord {
            merchant: merchant.trim().to_string(),
            category: category.to_string(),
            frequency: 1,
            last_memo: non_empty(memo),
            updated_at: now,
        }
    }

    /// Records one more confirmation. The stored merchant spelling is kept.
    pub fn reinforce(&mut self, category: &str, memo: Option<&str>, now: DateTime<Utc>) {
        self.category = category.to_string();
        self.frequency = self.frequency.saturating_add(1);
        self.last_memo = non_empty(memo);
        self.updated_at = now;
    }

    /// Storage identity: case-insensitive exact equality.
    pub fn is_same_merchant(&self, merchant: &str) -> bool {
        self.merchant.to_lowercase() == merchant.trim().to_lowercase()
    }

    /// Classification lookup: case-insensitive containment in either direction.
    pub fn overlaps(&self, merchant: &str) -> bool {
        let key = self.merchant.to_lowercase();
        let query = merchant.to_lowercase();
        if key.is_empty() || query.is_empty() {
            return false;
        }
        key.contains(&query) || query.contains(&key)
    }

    pub fn history_line(&self) -> String {
        format!(
            "履歴: {} - {} ({}回) - {}",
            self.category,
            category_name(&self.category),
            self.frequency,
            self.last_memo.as_deref().unwrap_or("なし")
        )
    }
}

fn non_empty(memo: Option<&str>) -> Option<String> {
    memo.map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}

/// First record overlapping `merchant`, in store order.
pub fn find_learned<'a>(records: &'a [LearningRecord], merchant: &str) -> Option<&'a LearningRecord> {
    let mut hits = records.iter().filter(|r| r.overlaps(merchant));
    let first = hits.next()?;
    let others = hits.count();
    if others > 0 {
        tracing::debug!(
            merchant,
            chosen = %first.merchant,
            others,
            "ambiguous learned match"
        );
    }
    Some(first)
}

/// Confidence curve for learned-tier results: `min(cap, base + frequency * step)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnedConfidence {
    pub base: f32,
    pub step: f32,
    pub cap: f32,
}

impl Default for LearnedConfidence {
    fn default() -> Self {
        Self {
            base: 0.7,
            step: 0.05,
            cap: 0.95,
        }
    }
}

impl LearnedConfidence {
    pub fn score(&self, frequency: u32) -> f32 {
        (self.base + frequency as f32 * self.step).min(self.cap)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LearningStats {
    pub total_merchants: usize,
    pub total_frequency: u64,
    pub most_learned: Vec<LearningRecord>,
    pub recent: Vec<LearningRecord>,
}

impl LearningStats {
    pub fn from_records(records: &[LearningRecord]) -> Self {
        let mut most_learned = records.to_vec();
        most_learned.sort_by(|a, b| b.frequency.cmp(&a.frequency));
        most_learned.truncate(STATS_TOP_N);

        let mut recent = records.to_vec();
        recent.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        recent.truncate(STATS_TOP_N);

        LearningStats {
            total_merchants: records.len(),
            total_frequency: records.iter().map(|r| u64::from(r.frequency)).sum(),
            most_learned,
            recent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MerchantDetail {
    pub merchant: String,
    pub category: String,
    pub category_name: String,
    pub frequency: u32,
    pub last_memo: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub confidence: f32,
}

impl MerchantDetail {
    pub fn from_record(record: &LearningRecord, curve: &LearnedConfidence) -> Self {
        MerchantDetail {
            merchant: record.merchant.clone(),
            category: record.category.clone(),
            category_name: category_name(&record.category).to_string(),
            frequency: record.frequency,
            last_memo: record.last_memo.clone(),
            updated_at: record.updated_at,
            confidence: curve.score(record.frequency),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_750_000_000 + secs, 0).unwrap()
    }

    fn record(merchant: &str, category: &str, frequency: u32, secs: i64) -> LearningRecord {
        LearningRecord {
            merchant: merchant.to_string(),
            category: category.to_string(),
            frequency,
            last_memo: None,
            updated_at: at(secs),
        }
    }

    #[test]
    fn new_record_starts_at_one() {
        let r = LearningRecord::new(" ENEOS ", "723", Some("給油"), at(0));
        assert_eq!(r.merchant, "ENEOS");
        assert_eq!(r.frequency, 1);
        assert_eq!(r.last_memo.as_deref(), Some("給油"));
    }

    #[test]
    fn blank_memo_is_not_kept() {
        let r = LearningRecord::new("ENEOS", "723", Some("  "), at(0));
        assert_eq!(r.last_memo, None);
    }

    #[test]
    fn reinforce_overwrites_and_counts() {
        let mut r = LearningRecord::new("ENEOS", "723", Some("給油"), at(0));
        r.reinforce("722", None, at(30));
        assert_eq!(r.frequency, 2);
        assert_eq!(r.category, "722");
        assert_eq!(r.last_memo, None);
        assert_eq!(r.updated_at, at(30));
    }

    #[test]
    fn same_merchant_is_case_insensitive_exact() {
        let r = record("Amazon", "728", 1, 0);
        assert!(r.is_same_merchant("AMAZON"));
        assert!(r.is_same_merchant(" amazon "));
        assert!(!r.is_same_merchant("amazon.co.jp"));
    }

    #[test]
    fn overlap_is_bidirectional() {
        let r = record("ENEOS中央店", "723", 3, 0);
        assert!(r.overlaps("ENEOS"));
        assert!(r.overlaps("eneos中央店 本館"));
        assert!(!r.overlaps("出光"));
    }

    #[test]
    fn empty_key_never_overlaps() {
        let r = record("", "745", 1, 0);
        assert!(!r.overlaps("anything"));
        assert!(!record("x", "745", 1, 0).overlaps(""));
    }

    #[test]
    fn find_learned_returns_first_in_order() {
        let records = vec![record("AMAZON MKT", "728", 1, 0), record("AMAZON", "741", 4, 0)];
        let hit = find_learned(&records, "Amazon").unwrap();
        assert_eq!(hit.category, "728");
        assert!(find_learned(&records, "楽天").is_none());
    }

    #[test]
    fn learned_confidence_is_capped_and_monotone() {
        let curve = LearnedConfidence::default();
        assert!((curve.score(1) - 0.75).abs() < 1e-6);
        assert!((curve.score(3) - 0.85).abs() < 1e-6);
        assert!(curve.score(1) < curve.score(5));
        assert!(curve.score(5) <= 0.95);
        assert_eq!(curve.score(100), 0.95);
    }

    #[test]
    fn stats_rank_by_frequency_and_recency() {
        let records: Vec<_> = (0..7)
            .map(|i| record(&format!("m{i}"), "745", i + 1, 100 - i64::from(i)))
            .collect();
        let stats = LearningStats::from_records(&records);
        assert_eq!(stats.total_merchants, 7);
        assert_eq!(stats.total_frequency, 28);
        assert_eq!(stats.most_learned.len(), STATS_TOP_N);
        assert_eq!(stats.most_learned[0].merchant, "m6");
        assert_eq!(stats.recent.len(), STATS_TOP_N);
        assert_eq!(stats.recent[0].merchant, "m0");
    }

    #[test]
    fn stats_of_empty_store() {
        let stats = LearningStats::from_records(&[]);
        assert_eq!(stats.total_merchants, 0);
        assert_eq!(stats.total_frequency, 0);
        assert!(stats.most_learned.is_empty());
    }

    #[test]
    fn history_line_formats_category_name() {
        let mut r = record("ENEOS", "723", 3, 0);
        assert_eq!(r.history_line(), "履歴: 723 - 燃料費 (3回) - なし");
        r.last_memo = Some("給油".to_string());
        assert_eq!(r.history_line(), "履歴: 723 - 燃料費 (3回) - 給油");
    }

    #[test]
    fn merchant_detail_carries_confidence() {
        let r = record("ENEOS", "723", 2, 0);
        let detail = MerchantDetail::from_record(&r, &LearnedConfidence::default());
        assert_eq!(detail.category_name, "燃料費");
        assert!((detail.confidence - 0.8).abs() < 1e-6);
    }
}
