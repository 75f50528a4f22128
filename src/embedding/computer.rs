//! Cache-aware, batched embedding computation for a session's notes
use super::temporal::{temporal_features, TEMPORAL_DIM};
use super::{EmbeddingError, EmbeddingProvider};
use crate::config::EmbeddingConfig;
use crate::error::{GeistError, Result};
use crate::notes::Note;
use crate::storage::{EmbeddingRecord, EmbeddingStore};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Counters from one `compute` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeStats {
    /// Semantic vectors reused from the store
    pub cache_hits: usize,
    /// Semantic vectors produced by the model
    pub computed: usize,
    /// Notes with nothing to embed (zero semantic vector)
    pub empty: usize,
    /// Notes whose batch failed; zero vector, retried next session
    pub failed: usize,
    /// Records written back to the store
    pub persisted: usize,
    pub duration_ms: u64,
}

/// Vectors for the working note set, aligned with the input order
#[derive(Debug, Clone)]
pub struct ComputeOutcome {
    /// Semantic sub-vector followed by the temporal sub-vector
    pub vectors: Vec<Vec<f32>>,
    pub stats: ComputeStats,
}

/// The only producer of new vectors
///
/// Reuses cached semantic sub-vectors whose version tag still matches, embeds
/// the rest in batches, and appends per-session temporal features.
pub struct EmbeddingComputer {
    provider: Arc<dyn EmbeddingProvider>,
    store: Option<EmbeddingStore>,
    batch_size: usize,
    max_age_days: u32,
    max_retries: u32,
    include_model_in_version: bool,
}

struct Pending {
    index: usize,
    text: String,
    content_hash: String,
    version_tag: String,
}

impl EmbeddingComputer {
    /// Create a computer; `store` of `None` disables persistence
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        store: Option<EmbeddingStore>,
        config: &EmbeddingConfig,
    ) -> Self {
        Self {
            provider,
            store,
            batch_size: config.batch_size.max(1),
            max_age_days: config.max_age_days,
            max_retries: config.max_retries,
            include_model_in_version: config.include_model_in_version,
        }
    }

    /// Semantic sub-vector length
    pub fn semantic_dim(&self) -> usize {
        self.provider.dimension()
    }

    /// Full vector length (semantic + temporal)
    pub fn vector_dim(&self) -> usize {
        self.provider.dimension() + TEMPORAL_DIM
    }

    /// BLAKE3 hex digest of the embedded text
    pub fn content_hash(text: &str) -> String {
        blake3::hash(text.as_bytes()).to_hex().to_string()
    }

    /// Cache key for a content hash under the current model
    pub fn version_tag(&self, content_hash: &str) -> String {
        if self.include_model_in_version {
            format!("{}:{}", self.provider.model_name(), content_hash)
        } else {
            content_hash.to_string()
        }
    }

    /// Compute vectors for `notes` as of `session_date`
    ///
    /// Fails only when no note that needed a vector could obtain one; partial
    /// failures leave zero semantic vectors for the affected notes.
    pub fn compute(&self, notes: &[Note], session_date: NaiveDate) -> Result<ComputeOutcome> {
        let start = Instant::now();
        let dim = self.semantic_dim();
        let mut stats = ComputeStats::default();

        let paths: Vec<&str> = notes.iter().map(|n| n.path.as_str()).collect();
        let cached = self.load_cached(&paths);

        let mut semantic: Vec<Option<Vec<f32>>> = vec![None; notes.len()];
        let mut pending: Vec<Pending> = Vec::new();

        for (index, note) in notes.iter().enumerate() {
            let text = note.embeddable_text();
            if text.is_empty() {
                debug!("Note {} has no embeddable content", note.path);
                stats.empty += 1;
                continue;
            }

            let content_hash = Self::content_hash(&text);
            let version_tag = self.version_tag(&content_hash);

            match cached.get(&note.path) {
                Some(record) if record.version_tag == version_tag && record.vector.len() == dim => {
                    semantic[index] = Some(record.vector.clone());
                    stats.cache_hits += 1;
                }
                _ => pending.push(Pending {
                    index,
                    text,
                    content_hash,
                    version_tag,
                }),
            }
        }

        debug!(
            "{} cache hits, {} notes need embedding",
            stats.cache_hits,
            pending.len()
        );

        let mut to_persist: Vec<EmbeddingRecord> = Vec::with_capacity(pending.len());
        let mut last_error: Option<EmbeddingError> = None;

        for chunk in pending.chunks(self.batch_size) {
            let texts: Vec<String> = chunk.iter().map(|p| p.text.clone()).collect();

            match self.embed_with_retry(&texts) {
                Ok(embeddings) => {
                    let computed_at = Utc::now();
                    for (item, embedding) in chunk.iter().zip(embeddings) {
                        to_persist.push(EmbeddingRecord {
                            note_path: notes[item.index].path.clone(),
                            vector: embedding.clone(),
                            version_tag: item.version_tag.clone(),
                            content_hash: item.content_hash.clone(),
                            model: self.provider.model_name().to_string(),
                            computed_at,
                        });
                        semantic[item.index] = Some(embedding);
                    }
                    stats.computed += chunk.len();
                }
                Err(e) => {
                    warn!("Embedding batch of {} notes failed: {}", chunk.len(), e);
                    stats.failed += chunk.len();
                    last_error = Some(e);
                }
            }
        }

        if stats.failed > 0 && stats.computed == 0 && stats.cache_hits == 0 {
            let error = last_error.unwrap_or_else(|| {
                EmbeddingError::GenerationError("No embeddings produced".to_string())
            });
            return Err(GeistError::Embedding(error));
        }

        stats.persisted = self.persist(&to_persist);

        let vectors = notes
            .iter()
            .zip(semantic)
            .map(|(note, semantic)| {
                let mut vector = semantic.unwrap_or_else(|| vec![0.0; dim]);
                vector.extend_from_slice(&temporal_features(
                    note.created,
                    session_date,
                    self.max_age_days,
                ));
                vector
            })
            .collect();

        stats.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Embeddings ready for {} notes: {} cached, {} computed, {} empty, {} failed, {}ms",
            notes.len(),
            stats.cache_hits,
            stats.computed,
            stats.empty,
            stats.failed,
            stats.duration_ms
        );

        Ok(ComputeOutcome { vectors, stats })
    }

    /// Semantic vectors for free text (no caching, no temporal features)
    ///
    /// Empty texts map to zero vectors.
    pub fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let dim = self.semantic_dim();
        let mut vectors = vec![vec![0.0; dim]; texts.len()];

        let non_empty: Vec<(usize, String)> = texts
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.trim().is_empty())
            .map(|(i, t)| (i, t.clone()))
            .collect();

        for chunk in non_empty.chunks(self.batch_size) {
            let batch: Vec<String> = chunk.iter().map(|(_, t)| t.clone()).collect();
            let embeddings = self.embed_with_retry(&batch)?;
            for ((index, _), embedding) in chunk.iter().zip(embeddings) {
                vectors[*index] = embedding;
            }
        }

        Ok(vectors)
    }

    fn load_cached(&self, paths: &[&str]) -> HashMap<String, EmbeddingRecord> {
        let Some(store) = &self.store else {
            return HashMap::new();
        };

        match store.get_many(paths) {
            Ok(records) => records,
            Err(e) => {
                warn!("Embedding cache read failed, recomputing: {}", e);
                HashMap::new()
            }
        }
    }

    fn persist(&self, records: &[EmbeddingRecord]) -> usize {
        let Some(store) = &self.store else {
            return 0;
        };

        match store.put_many(records) {
            Ok(count) => count,
            Err(e) => {
                warn!(
                    "Failed to persist {} embeddings, they will be recomputed next session: {}",
                    records.len(),
                    e
                );
                0
            }
        }
    }

    /// Embed one batch, retrying transient model failures
    fn embed_with_retry(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut attempt = 0;
        loop {
            let result = self
                .provider
                .embed_batch(texts)
                .and_then(|embeddings| self.validate_batch(texts.len(), embeddings));

            match result {
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    debug!("Retrying embedding batch (attempt {}): {}", attempt + 1, e);
                }
                other => return other,
            }
        }
    }

    /// One vector per input, each `semantic_dim` wide, for any provider
    fn validate_batch(
        &self,
        expected: usize,
        embeddings: Vec<Vec<f32>>,
    ) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
        if embeddings.len() != expected {
            return Err(EmbeddingError::GenerationError(format!(
                "Embedding count mismatch: expected {}, got {}",
                expected,
                embeddings.len()
            )));
        }

        let dim = self.semantic_dim();
        if let Some(bad) = embeddings.iter().find(|e| e.len() != dim) {
            return Err(EmbeddingError::DimensionMismatch {
                expected: dim,
                actual: bad.len(),
            });
        }
        Ok(embeddings)
    }
}
