// Quality stage: cheap lexical heuristics, no embeddings
use crate::config::FilteringConfig;
use crate::error::{GeistError, Result};
use crate::filtering::types::Suggestion;
use crate::filtering::utils;
use regex::Regex;

/// Opening words that frame a suggestion as a question or provocation
const INTERROGATIVE_PATTERN: &str = r"(?i)^\W*(what|why|how|when|where|who|which|whose|could|would|should|might|may|is|are|was|were|do|does|did|can|will|has|have|if)\b";

/// Texts whose character entropy falls below this are degenerate
const MIN_ENTROPY: f32 = 2.0;

/// Minimum word count before the repetition ratio is meaningful
const MIN_WORDS_FOR_REPETITION: usize = 4;

/// Why a suggestion failed the quality stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityIssue {
    TooShort,
    TooLong,
    Repetitive,
    NotInterrogative,
}

pub struct QualityFilter {
    min_length: usize,
    max_length: usize,
    max_repetition_ratio: f32,
    require_interrogative: bool,
    interrogative: Regex,
}

impl QualityFilter {
    pub fn new(config: &FilteringConfig) -> Result<Self> {
        let interrogative = Regex::new(INTERROGATIVE_PATTERN).map_err(|e| {
            GeistError::Config(format!("Invalid interrogative pattern: {}", e))
        })?;

        Ok(Self {
            min_length: config.min_length,
            max_length: config.max_length,
            max_repetition_ratio: config.max_repetition_ratio,
            require_interrogative: config.require_interrogative,
            interrogative,
        })
    }

    /// First failed check, if any
    pub fn check(&self, suggestion: &Suggestion) -> Option<QualityIssue> {
        let text = suggestion.text.trim();
        let length = text.chars().count();

        if length < self.min_length {
            return Some(QualityIssue::TooShort);
        }
        if length > self.max_length {
            return Some(QualityIssue::TooLong);
        }

        let word_count = utils::words(text).len();
        if word_count >= MIN_WORDS_FOR_REPETITION
            && utils::repetition_ratio(text) > self.max_repetition_ratio
        {
            return Some(QualityIssue::Repetitive);
        }
        if utils::shannon_entropy(text) < MIN_ENTROPY {
            return Some(QualityIssue::Repetitive);
        }

        if self.require_interrogative && !self.is_interrogative(text) {
            return Some(QualityIssue::NotInterrogative);
        }

        None
    }

    /// Question mark anywhere, or a question word up front
    pub fn is_interrogative(&self, text: &str) -> bool {
        text.contains('?') || self.interrogative.is_match(text)
    }

    pub fn filter(&self, suggestions: Vec<Suggestion>) -> Vec<Suggestion> {
        suggestions
            .into_iter()
            .filter(|s| match self.check(s) {
                None => true,
                Some(issue) => {
                    tracing::debug!("Quality: dropping {} suggestion ({:?})", s.geist_id, issue);
                    false
                }
            })
            .collect()
    }
}
