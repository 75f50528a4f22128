use crate::config::Config;
use crate::error::{GeistError, Result, ValidationError};

/// Providers understood by `embedding::build_provider`
pub const KNOWN_PROVIDERS: [&str; 2] = ["fastembed", "hashing"];

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every problem found
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_query(config, &mut errors);
        Self::validate_filtering(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(GeistError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.storage.db_path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.db_path",
                "Database path cannot be empty",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        let provider = &config.embedding.provider;
        if !KNOWN_PROVIDERS.contains(&provider.as_str()) {
            errors.push(ValidationError::new(
                "embedding.provider",
                format!(
                    "Provider must be one of {:?}, got '{}'",
                    KNOWN_PROVIDERS, provider
                ),
            ));
        }

        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if config.embedding.dimension == 0 {
            errors.push(ValidationError::new(
                "embedding.dimension",
                "Dimension must be greater than 0",
            ));
        }

        if config.embedding.max_age_days == 0 {
            errors.push(ValidationError::new(
                "embedding.max_age_days",
                "Maximum age must be at least one day",
            ));
        }

        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }
    }

    fn validate_query(config: &Config, errors: &mut Vec<ValidationError>) {
        let query = &config.query;

        if query.cluster_min_size < 2 {
            errors.push(ValidationError::new(
                "query.cluster_min_size",
                "Clusters need at least 2 members",
            ));
        }

        if !(0.0..=2.0).contains(&query.cluster_eps) || query.cluster_eps == 0.0 {
            errors.push(ValidationError::new(
                "query.cluster_eps",
                format!(
                    "Cosine distance radius must be in (0.0, 2.0], got {}",
                    query.cluster_eps
                ),
            ));
        }

        Self::check_unit_interval(
            "query.unlinked_min_similarity",
            query.unlinked_min_similarity,
            errors,
        );
        Self::check_unit_interval("query.label_diversity", query.label_diversity, errors);
    }

    fn validate_filtering(config: &Config, errors: &mut Vec<ValidationError>) {
        let filtering = &config.filtering;

        Self::check_unit_interval(
            "filtering.novelty_threshold",
            filtering.novelty_threshold,
            errors,
        );
        Self::check_unit_interval(
            "filtering.diversity_threshold",
            filtering.diversity_threshold,
            errors,
        );
        Self::check_unit_interval(
            "filtering.max_repetition_ratio",
            filtering.max_repetition_ratio,
            errors,
        );

        if filtering.min_length > filtering.max_length {
            errors.push(ValidationError::new(
                "filtering.min_length",
                format!(
                    "Minimum length {} exceeds maximum length {}",
                    filtering.min_length, filtering.max_length
                ),
            ));
        }
    }

    fn check_unit_interval(path: &str, value: f32, errors: &mut Vec<ValidationError>) {
        if !(0.0..=1.0).contains(&value) {
            errors.push(ValidationError::new(
                path,
                format!("Value must be between 0.0 and 1.0, got {}", value),
            ));
        }
    }
}
