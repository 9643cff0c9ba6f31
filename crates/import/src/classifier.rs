use keihi_core::{
    find_learned, ClassificationResult, ClassificationTier, LearnedConfidence, LearningRecord,
    NormalizedTransaction,
};
use serde::{Deserialize, Serialize};

use crate::memo::{MemoGenerator, MemoPicker, RandomPicker};
use crate::rules::KeywordRules;

/// Transactions of at least `min_amount` fall into `category`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmountTier {
    pub min_amount: i64,
    pub category: String,
    pub confidence: f32,
}

impl AmountTier {
    fn new(min_amount: i64, category: &str, confidence: f32) -> Self {
        Self {
            min_amount,
            category: category.to_string(),
            confidence,
        }
    }
}

/// Tunable constants of the classification cascade. Learned results must stay
/// above rule results, which must stay above amount guesses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierPolicy {
    pub learned: LearnedConfidence,
    pub rule_confidence: f32,
    pub amount_tiers: Vec<AmountTier>,
    pub fallback_category: String,
    pub fallback_confidence: f32,
}

impl Default for ClassifierPolicy {
    fn default() -> Self {
        Self {
            learned: LearnedConfidence::default(),
            rule_confidence: 0.6,
            amount_tiers: vec![
                AmountTier::new(50_000, "744", 0.4),
                AmountTier::new(10_000, "722", 0.4),
                AmountTier::new(5_000, "727", 0.4),
                AmountTier::new(1_000, "717", 0.4),
            ],
            fallback_category: "745".to_string(),
            fallback_confidence: 0.3,
        }
    }
}

/// Three-tier classifier: learned history, then keyword rules, then amount.
pub struct ExpenseClassifier<P = RandomPicker> {
    rules: KeywordRules,
    policy: ClassifierPolicy,
    memos: MemoGenerator<P>,
}

impl Default for ExpenseClassifier {
    fn default() -> Self {
        Self::new(
            KeywordRules::default(),
            ClassifierPolicy::default(),
            MemoGenerator::default(),
        )
    }
}

impl<P: MemoPicker> ExpenseClassifier<P> {
    pub fn new(rules: KeywordRules, mut policy: ClassifierPolicy, memos: MemoGenerator<P>) -> Self {
        // Highest threshold first.
        policy
            .amount_tiers
            .sort_by(|a, b| b.min_amount.cmp(&a.min_amount));
        Self {
            rules,
            policy,
            memos,
        }
    }

    pub fn policy(&self) -> &ClassifierPolicy {
        &self.policy
    }

    /// Classifies against a read-only snapshot of the learning store. Never
    /// fails; the amount tier always has an answer.
    pub fn classify(
        &self,
        txn: &NormalizedTransaction,
        learned: &[LearningRecord],
    ) -> ClassificationResult {
        let amount = txn.amount();

        if let Some(record) = find_learned(learned, txn.merchant()) {
            let memo = record
                .last_memo
                .clone()
                .unwrap_or_else(|| self.memos.generate(&record.category, amount));
            return ClassificationResult {
                category: record.category.clone(),
                confidence: self.policy.learned.score(record.frequency),
                memo,
                tier: ClassificationTier::Learned,
                learning_record: Some(record.clone()),
            };
        }

        if let Some(rule) = self.rules.find(txn.merchant()) {
            return ClassificationResult {
                category: rule.category.clone(),
                confidence: self.policy.rule_confidence,
                memo: self.memos.generate(&rule.category, amount),
                tier: ClassificationTier::Rule,
                learning_record: None,
            };
        }

        let (category, confidence) = self.amount_tier(amount);
        ClassificationResult {
            category: category.to_string(),
            confidence,
            memo: self.memos.generate(category, amount),
            tier: ClassificationTier::Amount,
            learning_record: None,
        }
    }

    pub fn classify_batch(
        &self,
        txns: &[NormalizedTransaction],
        learned: &[LearningRecord],
    ) -> Vec<ClassificationResult> {
        txns.iter().map(|t| self.classify(t, learned)).collect()
    }

    /// Memo for a user-chosen category, using the same templates.
    pub fn memo_for(&self, category: &str, amount: i64) -> String {
        self.memos.generate(category, amount)
    }

    fn amount_tier(&self, amount: i64) -> (&str, f32) {
        self.policy
            .amount_tiers
            .iter()
            .find(|t| amount >= t.min_amount)
            .map(|t| (t.category.as_str(), t.confidence))
            .unwrap_or((
                self.policy.fallback_category.as_str(),
                self.policy.fallback_confidence,
            ))
    }
}
