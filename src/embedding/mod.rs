/// Embedding computation and caching
///
/// Architecture:
/// - EmbeddingProvider trait for abstraction over backends
/// - FastEmbedProvider for local model embedding (all-MiniLM-L6-v2, 384-dim)
/// - HashingProvider for model-free, deterministic embedding
/// - EmbeddingComputer: cache lookup, batched model calls, temporal features
mod computer;
mod provider;
mod temporal;

pub use computer::{ComputeOutcome, ComputeStats, EmbeddingComputer};
pub use provider::{
    cosine_similarity, EmbeddingError, EmbeddingProvider, FastEmbedProvider, HashingProvider,
};
pub use temporal::{temporal_features, TEMPORAL_DIM};

use crate::config::EmbeddingConfig;
use std::sync::Arc;

/// Build the provider named by `config.provider`
pub fn build_provider(
    config: &EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    match config.provider.as_str() {
        "fastembed" => Ok(Arc::new(FastEmbedProvider::new(&config.model)?)),
        "hashing" => Ok(Arc::new(HashingProvider::new(config.dimension))),
        other => Err(EmbeddingError::InitializationError(format!(
            "Unknown embedding provider: {}",
            other
        ))),
    }
}
