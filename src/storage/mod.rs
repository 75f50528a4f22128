//! Storage layer for GeistFabrik
//!
//! One SQLite file holds the embedding cache, session records and the
//! suggestion history. Everything in memory stays with the session.

pub mod database;
pub mod embeddings;
pub mod history;

use crate::error::Result;
use std::path::Path;
use std::sync::Arc;

pub use database::{Database, DbPool, DbStats};
pub use embeddings::{decode_vector, encode_vector, EmbeddingRecord, EmbeddingStore};
pub use history::{HistoryEntry, SuggestionHistory};

/// Storage manager handing out the stores that share one database
pub struct StorageManager {
    pub database: Arc<Database>,
    pub embeddings: EmbeddingStore,
    pub history: SuggestionHistory,
}

impl StorageManager {
    /// Open the database at `db_path`, creating it if needed
    pub fn open(db_path: &Path) -> Result<Self> {
        let database = Arc::new(Database::new(db_path)?);
        tracing::info!("Storage opened at {}", db_path.display());

        Ok(Self {
            embeddings: EmbeddingStore::new(database.clone()),
            history: SuggestionHistory::new(database.clone()),
            database,
        })
    }
}
