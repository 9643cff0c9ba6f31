use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Memo used for categories without a template rule.
pub const DEFAULT_MEMO: &str = "経費";

/// Memo templates for one category, split at an amount threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoRule {
    pub threshold: i64,
    pub below: Vec<String>,
    pub at_or_above: Vec<String>,
}

impl MemoRule {
    pub fn new(threshold: i64, below: &[&str], at_or_above: &[&str]) -> Self {
        Self {
            threshold,
            below: below.iter().map(|s| s.to_string()).collect(),
            at_or_above: at_or_above.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn candidates(&self, amount: i64) -> &[String] {
        if amount >= self.threshold {
            &self.at_or_above
        } else {
            &self.below
        }
    }
}

/// Built-in templates hold generic phrases only, never names of people or
/// clients. Put personal templates in `[memo.<code>]` in the config file; they
/// replace the entry for that code.
pub fn default_memo_rules() -> BTreeMap<String, MemoRule> {
    BTreeMap::from([
        (
            "737".to_string(),
            MemoRule::new(5000, &["打ち合わせ", "商談"], &["打ち合わせ", "商談", "会議"]),
        ),
        (
            "722".to_string(),
            MemoRule::new(10000, &["打ち合わせ 移動", "商談 移動"], &["出張"]),
        ),
    ])
}

/// Source of the index used to pick one memo out of a candidate list.
pub trait MemoPicker: Send + Sync {
    /// Returns an index in `0..len`. `len` is never zero.
    fn pick(&self, len: usize) -> usize;
}

/// Uniform pick from the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomPicker;

impl MemoPicker for RandomPicker {
    fn pick(&self, len: usize) -> usize {
        rand::thread_rng().gen_range(0..len)
    }
}

/// Always the same position, clamped to the list. Pins memos in tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedPicker(pub usize);

impl MemoPicker for FixedPicker {
    fn pick(&self, len: usize) -> usize {
        self.0.min(len - 1)
    }
}

pub struct MemoGenerator<P = RandomPicker> {
    rules: BTreeMap<String, MemoRule>,
    picker: P,
}

impl Default for MemoGenerator {
    fn default() -> Self {
        Self::new(default_memo_rules(), RandomPicker)
    }
}

impl<P: MemoPicker> MemoGenerator<P> {
    pub fn new(rules: BTreeMap<String, MemoRule>, picker: P) -> Self {
        Self { rules, picker }
    }

    /// Picks a memo for `category`. Non-deterministic with [`RandomPicker`].
    pub fn generate(&self, category: &str, amount: i64) -> String {
        let Some(rule) = self.rules.get(category) else {
            return DEFAULT_MEMO.to_string();
        };
        let options = rule.candidates(amount);
        if options.is_empty() {
            return DEFAULT_MEMO.to_string();
        }
        let idx = self.picker.pick(options.len()).min(options.len() - 1);
        options[idx].clone()
    }

    pub fn rules(&self) -> &BTreeMap<String, MemoRule> {
        &self.rules
    }
}
