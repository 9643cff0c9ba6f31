pub mod db;
pub mod json;
pub mod repository;
pub mod store;

pub use db::{create_db, create_memory_db, DbPool, SqliteRepository};
pub use json::JsonFileRepository;
pub use repository::{AnyRepository, LearningRepository, StoreError};
pub use store::LearningStore;
