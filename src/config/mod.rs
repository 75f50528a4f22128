//! Configuration management for GeistFabrik
//!
//! Configuration is loaded once per invocation, validated, and then handed to
//! the session, query engine and filter pipeline as an immutable value.

use crate::error::{GeistError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta", default)]
    pub meta: MetaConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub filtering: FilteringConfig,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

impl Default for MetaConfig {
    fn default() -> Self {
        Self {
            schema_version: "1.0.0".to_string(),
            created_at: current_timestamp(),
            last_modified: current_timestamp(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite file holding cached embeddings and suggestion history
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("~/.geistfabrik/embeddings.db"),
        }
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Model name (e.g., "all-MiniLM-L6-v2")
    pub model: String,
    /// Backend: "fastembed" or "hashing"
    pub provider: String,
    /// Semantic sub-vector length
    pub dimension: usize,
    /// Number of texts per model invocation
    pub batch_size: usize,
    /// Note age (days) at which the normalized age feature saturates
    pub max_age_days: u32,
    /// Retries for a failed batch before degrading to zero vectors
    pub max_retries: u32,
    /// Whether the model name is part of the cache version tag
    pub include_model_in_version: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "all-MiniLM-L6-v2".to_string(),
            provider: "fastembed".to_string(),
            dimension: 384,
            batch_size: 32,
            max_age_days: 3650,
            max_retries: 1,
            include_model_in_version: true,
        }
    }
}

/// Query engine tuning knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Upper bound on notes compared pairwise by `unlinked_pairs`
    pub unlinked_candidate_limit: usize,
    /// Pairs below this similarity are never reported as unlinked pairs
    pub unlinked_min_similarity: f32,
    /// Minimum members for a cluster (also DBSCAN's min_samples)
    pub cluster_min_size: usize,
    /// DBSCAN neighbourhood radius in cosine distance
    pub cluster_eps: f32,
    /// Phrases kept per cluster label
    pub label_terms: usize,
    /// Frequent n-grams considered before centroid re-ranking
    pub label_candidates: usize,
    /// MMR lambda: 1.0 is pure relevance, 0.0 is pure diversity
    pub label_diversity: f32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            unlinked_candidate_limit: 200,
            unlinked_min_similarity: 0.5,
            cluster_min_size: 5,
            cluster_eps: 0.35,
            label_terms: 4,
            label_candidates: 30,
            label_diversity: 0.7,
        }
    }
}

/// Suggestion filtering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilteringConfig {
    pub boundary_enabled: bool,
    pub novelty_enabled: bool,
    pub diversity_enabled: bool,
    pub quality_enabled: bool,
    /// Similarity at or above which a suggestion repeats history
    pub novelty_threshold: f32,
    /// Trailing window of history considered by the novelty stage
    pub lookback_days: u32,
    /// Similarity at or above which two batch members are duplicates
    pub diversity_threshold: f32,
    /// Batches larger than this are deduplicated by clustering
    pub diversity_cluster_above: usize,
    pub min_length: usize,
    pub max_length: usize,
    /// Maximum share of repeated words before text counts as degenerate
    pub max_repetition_ratio: f32,
    pub require_interrogative: bool,
    /// Path prefixes suggestions may not reference
    pub excluded_paths: Vec<String>,
}

impl Default for FilteringConfig {
    fn default() -> Self {
        Self {
            boundary_enabled: true,
            novelty_enabled: true,
            diversity_enabled: true,
            quality_enabled: true,
            novelty_threshold: 0.80,
            lookback_days: 60,
            diversity_threshold: 0.75,
            diversity_cluster_above: 64,
            min_length: 10,
            max_length: 2000,
            max_repetition_ratio: 0.5,
            require_interrogative: false,
            excluded_paths: Vec::new(),
        }
    }
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub novelty_threshold: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lookback_days: Option<u32>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(GeistError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| GeistError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| GeistError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| GeistError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_profile(profile)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self
            .profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| GeistError::Config(format!("Unknown profile: {}", profile)))?;

        if let Some(provider) = overrides.embedding_provider {
            self.embedding.provider = provider;
        }
        if let Some(threshold) = overrides.novelty_threshold {
            self.filtering.novelty_threshold = threshold;
        }
        if let Some(days) = overrides.lookback_days {
            self.filtering.lookback_days = days;
        }
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: GEIST_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("GEIST_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "EMBEDDING__MODEL" => {
                self.embedding.model = value.to_string();
            }
            "EMBEDDING__PROVIDER" => {
                self.embedding.provider = value.to_string();
            }
            "FILTERING__NOVELTY_THRESHOLD" => {
                self.filtering.novelty_threshold =
                    value.parse().map_err(|_| GeistError::InvalidConfigValue {
                        path: path.to_string(),
                        message: format!("Cannot parse '{}' as a number", value),
                    })?;
            }
            "FILTERING__LOOKBACK_DAYS" => {
                self.filtering.lookback_days =
                    value.parse().map_err(|_| GeistError::InvalidConfigValue {
                        path: path.to_string(),
                        message: format!("Cannot parse '{}' as days", value),
                    })?;
            }
            "STORAGE__DB_PATH" => {
                self.storage.db_path = PathBuf::from(value);
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| GeistError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("geistfabrik").join("config.toml"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig::default(),
            storage: StorageConfig::default(),
            embedding: EmbeddingConfig::default(),
            query: QueryConfig::default(),
            filtering: FilteringConfig::default(),
            profiles: HashMap::new(),
        }
    }
}

/// Expand a leading `~` to the user's home directory
pub fn expand_path(path: &Path) -> Result<PathBuf> {
    let raw = path.to_string_lossy();
    if let Some(rest) = raw.strip_prefix("~") {
        let home = dirs::home_dir()
            .ok_or_else(|| GeistError::Config("Cannot determine home directory".to_string()))?;
        return Ok(home.join(rest.trim_start_matches('/')));
    }
    Ok(path.to_path_buf())
}
