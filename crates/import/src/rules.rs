use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Merchant keyword → category code. Order matters: the first hit wins, so
/// `オフィス` shadows `オフィス用品` and `文具` shadows `文房具`.
pub const DEFAULT_KEYWORD_RULES: &[(&str, &str)] = &[
    ("スターバックス", "717"),
    ("マクドナルド", "717"),
    ("セブンイレブン", "717"),
    ("ローソン", "717"),
    ("ファミリーマート", "717"),
    ("ガソリンスタンド", "723"),
    ("ENEOS", "723"),
    ("出光", "723"),
    ("コスモ", "723"),
    ("NTT", "724"),
    ("KDDI", "724"),
    ("ソフトバンク", "724"),
    ("東京電力", "725"),
    ("関西電力", "725"),
    ("東京ガス", "725"),
    ("大阪ガス", "725"),
    ("水道局", "725"),
    ("国税庁", "726"),
    ("税務署", "726"),
    ("都税事務所", "726"),
    ("区役所", "726"),
    ("市役所", "726"),
    ("ホテル", "722"),
    ("旅館", "722"),
    ("航空", "722"),
    ("JR", "722"),
    ("地下鉄", "722"),
    ("バス", "722"),
    ("タクシー", "722"),
    ("レストラン", "727"),
    ("居酒屋", "727"),
    ("カフェ", "727"),
    ("会議室", "737"),
    ("コワーキング", "737"),
    ("オフィス", "737"),
    ("文具", "729"),
    ("オフィス用品", "729"),
    ("文房具", "729"),
    ("消耗品", "728"),
    ("リース", "738"),
    ("保険", "733"),
    ("手数料", "734"),
    ("会費", "739"),
    ("新聞", "741"),
    ("図書", "741"),
    ("家賃", "744"),
    ("賃貸", "744"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordRule {
    pub keyword: String,
    pub category: String,
}

impl KeywordRule {
    pub fn new(keyword: &str, category: &str) -> Self {
        Self {
            keyword: keyword.to_string(),
            category: category.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("Failed to parse rules TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Rule for category {0} has an empty keyword")]
    EmptyKeyword(String),
}

#[derive(Deserialize)]
struct RuleFile {
    #[serde(default)]
    rules: Vec<KeywordRule>,
}

/// Internal pairing of a rule with its lowercased keyword.
#[derive(Debug, Clone)]
struct CompiledRule {
    rule: KeywordRule,
    needle: String,
}

/// Ordered keyword table for the rule tier.
#[derive(Debug, Clone)]
pub struct KeywordRules {
    rules: Vec<CompiledRule>,
}

impl Default for KeywordRules {
    fn default() -> Self {
        Self::new(
            DEFAULT_KEYWORD_RULES
                .iter()
                .map(|(k, c)| KeywordRule::new(k, c))
                .collect(),
        )
    }
}

impl KeywordRules {
    /// Empty keywords are dropped; they would match every merchant.
    pub fn new(rules: Vec<KeywordRule>) -> Self {
        let rules = rules
            .into_iter()
            .filter(|rule| !rule.keyword.trim().is_empty())
            .map(|rule| CompiledRule {
                needle: rule.keyword.to_lowercase(),
                rule,
            })
            .collect();
        Self { rules }
    }

    /// Parses `[[rules]]` tables with `keyword` and `category`.
    pub fn parse_toml(toml_content: &str) -> Result<Vec<KeywordRule>, RuleError> {
        let file: RuleFile = toml::from_str(toml_content)?;
        if let Some(bad) = file.rules.iter().find(|r| r.keyword.trim().is_empty()) {
            return Err(RuleError::EmptyKeyword(bad.category.clone()));
        }
        Ok(file.rules)
    }

    /// User rules first, then the built-in table.
    pub fn with_overrides(extra: Vec<KeywordRule>) -> Self {
        let mut rules = extra;
        rules.extend(
            DEFAULT_KEYWORD_RULES
                .iter()
                .map(|(k, c)| KeywordRule::new(k, c)),
        );
        Self::new(rules)
    }

    pub fn find(&self, merchant: &str) -> Option<&KeywordRule> {
        let text = merchant.to_lowercase();
        self.rules
            .iter()
            .find(|cr| text.contains(&cr.needle))
            .map(|cr| &cr.rule)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
