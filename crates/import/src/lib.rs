//! Statement ingestion, classification and export.

pub mod classifier;
pub mod csv;
pub mod date;
pub mod export;
pub mod memo;
pub mod row;
pub mod rules;

pub use self::csv::{
    decode, ingest, CsvIngestor, ImportError, IngestReport, ParseError, SourceEncoding,
};
pub use classifier::{AmountTier, ClassifierPolicy, ExpenseClassifier};
pub use date::{looks_like_raw_date, normalize_date};
pub use export::{default_file_name, export_confirmed, export_csv, ExportError, BOM};
pub use memo::{
    default_memo_rules, FixedPicker, MemoGenerator, MemoPicker, MemoRule, RandomPicker,
    DEFAULT_MEMO,
};
pub use row::{
    CarriedDate, DateAnchor, DateStrategy, ExplicitDateColumn, ExtractorConfig, HeaderPolicy,
    RowExtractor, RowRejected,
};
pub use rules::{KeywordRule, KeywordRules, RuleError, DEFAULT_KEYWORD_RULES};
