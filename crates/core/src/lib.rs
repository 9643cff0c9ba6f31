pub mod category;
pub mod learning;
pub mod transaction;

pub use category::{category_name, ExpenseCategory, EXPENSE_CATEGORIES, UNCLASSIFIED_NAME};
pub use learning::{
    find_learned, LearnedConfidence, LearningRecord, LearningStats, MerchantDetail,
    STATS_TOP_N,
};
pub use transaction::{
    ClassificationResult, ClassificationTier, ConfidenceLevel, NormalizedTransaction,
    RecordError, Transaction,
};
