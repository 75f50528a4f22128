/// Embedding provider trait, FastEmbed and feature-hashing implementations
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitializationError(String),

    /// Model invocation failed; the batch may be retried
    #[error("Embedding generation failed: {0}")]
    GenerationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl EmbeddingError {
    /// Whether retrying the same batch may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::GenerationError(_))
    }
}

/// Trait for embedding providers
///
/// Allows abstraction over different embedding backends. Implementations must
/// be deterministic for a given model and input text.
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embedding for a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Generate embeddings for multiple texts in one model invocation
    ///
    /// The output has exactly one vector per input, in input order.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// FastEmbed provider for local embedding generation
///
/// Uses all-MiniLM-L6-v2 model (384 dimensions) by default.
/// Runs fully offline once the model files are cached.
pub struct FastEmbedProvider {
    model: Arc<TextEmbedding>,
    model_name: String,
    dimension: usize,
}

impl FastEmbedProvider {
    /// Create a new FastEmbed provider with the specified model
    ///
    /// **Important**: Models are downloaded on-demand to `~/.cache/huggingface/`
    /// on first use. The smallest model (all-MiniLM-L6-v2) is ~90MB.
    pub fn new(model_name: &str) -> Result<Self, EmbeddingError> {
        let (embedding_model, dimension) = match model_name {
            "all-MiniLM-L6-v2" | "all-minilm-l6-v2" => (EmbeddingModel::AllMiniLML6V2, 384),
            "bge-small-en-v1.5" => (EmbeddingModel::BGESmallENV15, 384),
            "bge-base-en-v1.5" => (EmbeddingModel::BGEBaseENV15, 768),
            _ => {
                return Err(EmbeddingError::InitializationError(format!(
                    "Unsupported model: {}. Supported: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5",
                    model_name
                )));
            }
        };

        tracing::info!("Initializing embedding model: {} ({}D)", model_name, dimension);

        let init_options = InitOptions::new(embedding_model).with_show_download_progress(true);

        let model = TextEmbedding::try_new(init_options)
            .map_err(|e| EmbeddingError::InitializationError(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
            dimension,
        })
    }

    /// Create provider with default model (all-MiniLM-L6-v2)
    pub fn with_default_model() -> Result<Self, EmbeddingError> {
        Self::new("all-MiniLM-L6-v2")
    }
}

impl EmbeddingProvider for FastEmbedProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut embeddings = self.embed_batch(&[text.to_string()])?;
        embeddings
            .pop()
            .ok_or_else(|| EmbeddingError::GenerationError("No embeddings generated".to_string()))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        if texts.iter().any(|t| t.is_empty()) {
            return Err(EmbeddingError::InvalidInput(
                "Batch contains empty text".to_string(),
            ));
        }

        // Count and width are checked by the computer for every provider
        self.model
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Deterministic bag-of-words provider using signed feature hashing
///
/// Needs no model download. Texts sharing vocabulary land close together,
/// which is enough for offline runs and tests; it has no notion of synonyms.
pub struct HashingProvider {
    dimension: usize,
    model_name: String,
}

impl HashingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            model_name: format!("hashing-{}", dimension),
        }
    }

    fn project(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let lowered = text.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        for token in &tokens {
            self.accumulate(&mut vector, token.as_bytes(), 1.0);
        }
        // Bigrams keep word order from being entirely lost
        for pair in tokens.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            self.accumulate(&mut vector, bigram.as_bytes(), 0.5);
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }

    fn accumulate(&self, vector: &mut [f32], feature: &[u8], weight: f32) {
        let hash = blake3::hash(feature);
        let bytes = hash.as_bytes();
        let bucket = u64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]) as usize
            % self.dimension;
        let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

impl EmbeddingProvider for HashingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }
        Ok(self.project(text))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Cosine similarity between two vectors; zero when either has no magnitude
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashing_is_deterministic() {
        let provider = HashingProvider::new(64);
        let a = provider.embed("Emergent structure in notes").unwrap();
        let b = provider.embed("Emergent structure in notes").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_hashing_is_normalized() {
        let provider = HashingProvider::new(128);
        let v = provider.embed("some words to embed").unwrap();
        let magnitude: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hashing_similarity_tracks_overlap() {
        let provider = HashingProvider::new(384);
        let base = provider.embed("gardens grow slowly in spring rain").unwrap();
        let close = provider.embed("gardens grow slowly in the spring rain").unwrap();
        let far = provider.embed("compilers lower syntax trees to bytecode").unwrap();

        assert!(cosine_similarity(&base, &close) > 0.8);
        assert!(cosine_similarity(&base, &close) > cosine_similarity(&base, &far));
    }

    #[test]
    fn test_hashing_punctuation_only_is_zero() {
        let provider = HashingProvider::new(16);
        let v = provider.embed("?!...").unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_hashing_rejects_empty() {
        let provider = HashingProvider::new(16);
        assert!(provider.embed("").is_err());
    }

    #[test]
    fn test_cosine_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(EmbeddingError::GenerationError("x".into()).is_retryable());
        assert!(!EmbeddingError::InvalidInput("x".into()).is_retryable());
    }

    #[test]
    #[ignore] // Requires model download (~90MB) - run with: cargo test -- --ignored
    fn test_fastembed_batch_embedding() {
        let provider = FastEmbedProvider::with_default_model().unwrap();
        let texts = vec![
            "First test sentence.".to_string(),
            "Second test sentence.".to_string(),
        ];

        let embeddings = provider.embed_batch(&texts).unwrap();
        assert_eq!(embeddings.len(), 2);
        assert!(embeddings.iter().all(|e| e.len() == 384));
    }

    #[test]
    #[ignore] // Requires model download (~90MB) - run with: cargo test -- --ignored
    fn test_fastembed_semantic_similarity() {
        let provider = FastEmbedProvider::with_default_model().unwrap();

        let emb1 = provider.embed("The cat sits on the mat.").unwrap();
        let emb2 = provider.embed("A feline rests on the rug.").unwrap();
        let emb3 = provider.embed("Python programming language.").unwrap();

        assert!(cosine_similarity(&emb1, &emb2) > cosine_similarity(&emb1, &emb3));
    }
}
