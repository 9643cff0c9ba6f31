use keihi_import::{
    default_memo_rules, ClassifierPolicy, CsvIngestor, ExpenseClassifier, ExtractorConfig,
    KeywordRule, KeywordRules, MemoGenerator, MemoRule, RandomPicker, RowExtractor, RuleError,
};
use keihi_storage::{AnyRepository, JsonFileRepository, SqliteRepository, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error(transparent)]
    Rules(#[from] RuleError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Json,
    Sqlite,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub backend: Backend,
    /// Defaults to `learning.json` / `learning.db` in the data directory.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreSection,
    pub import: ExtractorConfig,
    pub classifier: ClassifierPolicy,
    /// Checked before the built-in keyword table.
    pub rules: Vec<KeywordRule>,
    /// Per-category memo templates, replacing the built-in ones.
    pub memo: BTreeMap<String, MemoRule>,
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", "keihi")
}

pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|d| d.config_dir().join("config.toml"))
}

pub fn default_data_dir() -> PathBuf {
    project_dirs()
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".keihi"))
}

impl Config {
    /// A missing file means defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::parse(&text).map_err(|e| match e {
            ConfigError::Toml { source, .. } => ConfigError::Toml {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(text).map_err(|source| ConfigError::Toml {
            path: PathBuf::new(),
            source,
        })?;
        config.rules = KeywordRules::parse_toml(text)?;
        Ok(config)
    }

    pub fn store_path(&self, data_dir: &Path) -> PathBuf {
        match (&self.store.path, self.store.backend) {
            (Some(path), _) => path.clone(),
            (None, Backend::Json) => data_dir.join("learning.json"),
            (None, Backend::Sqlite) => data_dir.join("learning.db"),
        }
    }

    pub async fn open_repository(&self, data_dir: &Path) -> Result<AnyRepository, StoreError> {
        let path = self.store_path(data_dir);
        tracing::debug!(backend = ?self.store.backend, path = %path.display(), "opening learning store");
        Ok(match self.store.backend {
            Backend::Json => AnyRepository::Json(JsonFileRepository::new(path)),
            Backend::Sqlite => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                AnyRepository::Sqlite(SqliteRepository::open(&path).await?)
            }
        })
    }

    pub fn ingestor(&self) -> CsvIngestor {
        CsvIngestor::new(RowExtractor::new(self.import.clone()))
    }

    pub fn memo_rules(&self) -> BTreeMap<String, MemoRule> {
        let mut rules = default_memo_rules();
        rules.extend(self.memo.clone());
        rules
    }

    pub fn classifier(&self) -> ExpenseClassifier<RandomPicker> {
        let keywords = if self.rules.is_empty() {
            KeywordRules::default()
        } else {
            KeywordRules::with_overrides(self.rules.clone())
        };
        ExpenseClassifier::new(
            keywords,
            self.classifier.clone(),
            MemoGenerator::new(self.memo_rules(), RandomPicker),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keihi_core::NormalizedTransaction;
    use keihi_import::HeaderPolicy;

    #[test]
    fn empty_config_is_default() {
        assert_eq!(Config::parse("").unwrap(), Config::default());
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn full_config() {
        let text = r#"
[store]
backend = "sqlite"
path = "/tmp/keihi/learning.db"

[import]
amount_offsets = [2, 3]
header_policy = "any_non_date"

[classifier]
rule_confidence = 0.65

[[rules]]
keyword = "コメダ"
category = "737"

[memo.728]
threshold = 3000
below = ["文房具"]
at_or_above = ["備品"]
"#;
        let config = Config::parse(text).unwrap();
        assert_eq!(config.store.backend, Backend::Sqlite);
        assert_eq!(
            config.store_path(Path::new("/data")),
            PathBuf::from("/tmp/keihi/learning.db")
        );
        assert_eq!(config.import.amount_offsets, vec![2, 3]);
        assert_eq!(config.import.header_policy, HeaderPolicy::AnyNonDate);
        assert!(!config.import.header_keywords.is_empty());
        assert!((config.classifier.rule_confidence - 0.65).abs() < 1e-6);

        let memos = config.memo_rules();
        assert_eq!(memos["728"].at_or_above, vec!["備品"]);
        assert!(memos.contains_key("737"));

        let classifier = config.classifier();
        let txn = NormalizedTransaction::new("2025/05/17", "コメダ珈琲", 900).unwrap();
        let r = classifier.classify(&txn, &[]);
        assert_eq!(r.category, "737");
        assert!((r.confidence - 0.65).abs() < 1e-6);
    }

    #[test]
    fn memo_table_replaces_builtin_phrases() {
        let text = r#"
[memo.737]
threshold = 5000
below = ["田中様 打ち合わせ"]
at_or_above = ["田中様 会食"]
"#;
        let config = Config::parse(text).unwrap();
        let memos = config.memo_rules();
        assert_eq!(memos["737"].candidates(3000), ["田中様 打ち合わせ".to_string()]);
        assert_eq!(memos["737"].candidates(8000), ["田中様 会食".to_string()]);
        assert_eq!(memos["722"], default_memo_rules()["722"]);
    }

    #[test]
    fn default_store_paths() {
        let config = Config::default();
        assert_eq!(
            config.store_path(Path::new("/data")),
            PathBuf::from("/data/learning.json")
        );
        let sqlite = Config {
            store: StoreSection {
                backend: Backend::Sqlite,
                path: None,
            },
            ..Config::default()
        };
        assert_eq!(
            sqlite.store_path(Path::new("/data")),
            PathBuf::from("/data/learning.db")
        );
    }

    #[test]
    fn blank_rule_keyword_is_rejected() {
        let text = "[[rules]]\nkeyword = \" \"\ncategory = \"717\"\n";
        assert!(matches!(
            Config::parse(text),
            Err(ConfigError::Rules(RuleError::EmptyKeyword(code))) if code == "717"
        ));
        let err = Config::parse(text).unwrap_err();
        assert!(err.to_string().contains("717"));
    }

    #[test]
    fn bad_toml_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[store\n").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("config.toml"));
    }
}
