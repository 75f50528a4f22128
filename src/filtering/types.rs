// Shared types for the suggestion filtering pipeline
use serde::{Deserialize, Serialize};

/// Candidate output produced by a geist
///
/// The pipeline never mutates a suggestion; it only accepts or drops it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub text: String,
    /// Paths of the notes this suggestion refers to
    #[serde(default)]
    pub notes: Vec<String>,
    /// Provenance tag of the geist that produced it
    pub geist_id: String,
}

impl Suggestion {
    pub fn new(
        text: impl Into<String>,
        notes: Vec<String>,
        geist_id: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            notes,
            geist_id: geist_id.into(),
        }
    }
}

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterStage {
    Boundary,
    Novelty,
    Diversity,
    Quality,
}

impl FilterStage {
    pub const ALL: [FilterStage; 4] = [
        FilterStage::Boundary,
        FilterStage::Novelty,
        FilterStage::Diversity,
        FilterStage::Quality,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Boundary => "boundary",
            Self::Novelty => "novelty",
            Self::Diversity => "diversity",
            Self::Quality => "quality",
        }
    }
}

/// Per-stage counts for one stage run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageStats {
    pub input: usize,
    pub rejected: usize,
    /// Disabled by configuration, or skipped after an embedding failure
    pub skipped: bool,
}

/// Statistics from one filtering run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterStats {
    /// Number of input suggestions
    pub input_count: usize,
    pub boundary: StageStats,
    pub novelty: StageStats,
    pub diversity: StageStats,
    pub quality: StageStats,
    /// Number of suggestions accepted
    pub output_count: usize,
    /// History texts compared against during novelty
    pub history_size: usize,
    /// Total processing time in milliseconds
    pub processing_time_ms: u64,
}

impl FilterStats {
    pub fn stage(&self, stage: FilterStage) -> &StageStats {
        match stage {
            FilterStage::Boundary => &self.boundary,
            FilterStage::Novelty => &self.novelty,
            FilterStage::Diversity => &self.diversity,
            FilterStage::Quality => &self.quality,
        }
    }

    pub fn stage_mut(&mut self, stage: FilterStage) -> &mut StageStats {
        match stage {
            FilterStage::Boundary => &mut self.boundary,
            FilterStage::Novelty => &mut self.novelty,
            FilterStage::Diversity => &mut self.diversity,
            FilterStage::Quality => &mut self.quality,
        }
    }

    pub fn total_rejected(&self) -> usize {
        FilterStage::ALL
            .iter()
            .map(|stage| self.stage(*stage).rejected)
            .sum()
    }
}

/// Accepted suggestions (input order preserved) plus statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterOutcome {
    pub accepted: Vec<Suggestion>,
    pub stats: FilterStats,
}
