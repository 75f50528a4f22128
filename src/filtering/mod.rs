// Four-stage suggestion filtering pipeline
//
// Boundary:  referenced notes exist and are not excluded (structural)
// Novelty:   not too similar to texts emitted within the lookback window
// Diversity: not too similar to an earlier suggestion in the same batch
// Quality:   length, repetition and framing heuristics (lexical)
//
// Rejection is silent: dropped suggestions are counted, never reported as errors.

mod boundary;
mod diversity;
mod novelty;
mod quality;
mod types;
mod utils;

pub use boundary::BoundaryFilter;
pub use diversity::DiversityFilter;
pub use novelty::NoveltyFilter;
pub use quality::{QualityFilter, QualityIssue};
pub use types::{FilterOutcome, FilterStage, FilterStats, StageStats, Suggestion};

use crate::config::FilteringConfig;
use crate::error::Result;
use crate::query::{stack_rows, unit_rows, QueryEngine};
use crate::storage::SuggestionHistory;
use chrono::NaiveDate;
use ndarray::{Array2, Axis};
use std::time::Instant;

/// Main filtering pipeline orchestrator
pub struct FilterPipeline {
    config: FilteringConfig,
    history: Option<SuggestionHistory>,
    boundary: BoundaryFilter,
    diversity: DiversityFilter,
    quality: QualityFilter,
}

impl FilterPipeline {
    /// Create a pipeline; without history the novelty stage sees an empty window
    pub fn new(config: FilteringConfig) -> Result<Self> {
        Ok(Self {
            boundary: BoundaryFilter::new(config.excluded_paths.clone()),
            diversity: DiversityFilter::new(
                config.diversity_threshold,
                config.diversity_cluster_above,
            ),
            quality: QualityFilter::new(&config)?,
            history: None,
            config,
        })
    }

    /// Read the novelty window from `history`
    pub fn with_history(mut self, history: SuggestionHistory) -> Self {
        self.history = Some(history);
        self
    }

    pub fn config(&self) -> &FilteringConfig {
        &self.config
    }

    /// Run every enabled stage in order
    ///
    /// # Arguments
    /// * `engine` - Query engine of the current session (note set, embeddings, date)
    /// * `suggestions` - Candidate batch, in generation order
    ///
    /// # Returns
    /// Accepted suggestions in input order, plus per-stage statistics
    pub fn filter(&self, engine: &QueryEngine, suggestions: Vec<Suggestion>) -> Result<FilterOutcome> {
        let start = Instant::now();
        let mut stats = FilterStats {
            input_count: suggestions.len(),
            ..FilterStats::default()
        };

        // Boundary
        let mut batch = run_stage(
            &mut stats,
            FilterStage::Boundary,
            self.config.boundary_enabled,
            suggestions,
            |batch| Ok(self.boundary.filter(batch, engine)),
        )?;

        // Novelty and diversity share one embedding of the surviving batch
        let needs_embedding = !batch.is_empty()
            && (self.config.novelty_enabled || self.config.diversity_enabled);
        let vectors = if needs_embedding {
            self.embed_batch(engine, &batch)
        } else {
            None
        };

        match vectors {
            Some(current) => {
                let (kept, current) = self.novelty_stage(engine, &mut stats, batch, current);
                let (kept, _) = self.diversity_stage(&mut stats, kept, current);
                batch = kept;
            }
            None => {
                stats.novelty.input = batch.len();
                stats.diversity.input = batch.len();
                stats.novelty.skipped = needs_embedding || !self.config.novelty_enabled;
                stats.diversity.skipped = needs_embedding || !self.config.diversity_enabled;
            }
        }

        // Quality
        let batch = run_stage(
            &mut stats,
            FilterStage::Quality,
            self.config.quality_enabled,
            batch,
            |batch| Ok(self.quality.filter(batch)),
        )?;

        stats.output_count = batch.len();
        stats.processing_time_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            "Filtered {} suggestions to {} (boundary -{}, novelty -{}, diversity -{}, quality -{})",
            stats.input_count,
            stats.output_count,
            stats.boundary.rejected,
            stats.novelty.rejected,
            stats.diversity.rejected,
            stats.quality.rejected
        );

        Ok(FilterOutcome {
            accepted: batch,
            stats,
        })
    }

    /// Persist accepted suggestions as the history of `date`
    ///
    /// Replaces anything previously recorded for `date`, so re-running a
    /// session date does not accumulate duplicates.
    pub fn record(
        history: &SuggestionHistory,
        date: NaiveDate,
        accepted: &[Suggestion],
    ) -> Result<usize> {
        let entries: Vec<(String, String)> = accepted
            .iter()
            .map(|s| (s.geist_id.clone(), s.text.clone()))
            .collect();
        history.record(date, &entries)
    }

    /// Unit-length semantic vectors for the batch, or `None` if embedding failed
    fn embed_batch(&self, engine: &QueryEngine, batch: &[Suggestion]) -> Option<Array2<f32>> {
        let texts: Vec<String> = batch.iter().map(|s| s.text.clone()).collect();
        match engine.embed_texts(&texts) {
            Ok(rows) => Some(unit_rows(&stack_rows(&rows, engine.semantic_dim()))),
            Err(e) => {
                tracing::warn!("Suggestion embedding failed, skipping novelty and diversity: {}", e);
                None
            }
        }
    }

    /// History window vectors; read or embedding failures yield an empty window
    fn history_vectors(&self, engine: &QueryEngine) -> Array2<f32> {
        let dim = engine.semantic_dim();
        let empty = Array2::zeros((0, dim));
        let Some(history) = &self.history else {
            return empty;
        };

        let texts = match history.texts_in_window(engine.session().date, self.config.lookback_days) {
            Ok(texts) => texts,
            Err(e) => {
                tracing::warn!("Suggestion history unavailable, treating as empty: {}", e);
                return empty;
            }
        };
        if texts.is_empty() {
            return empty;
        }

        match engine.embed_texts(&texts) {
            Ok(rows) => unit_rows(&stack_rows(&rows, dim)),
            Err(e) => {
                tracing::warn!("History embedding failed, treating as empty: {}", e);
                empty
            }
        }
    }

    fn novelty_stage(
        &self,
        engine: &QueryEngine,
        stats: &mut FilterStats,
        batch: Vec<Suggestion>,
        vectors: Array2<f32>,
    ) -> (Vec<Suggestion>, Array2<f32>) {
        stats.novelty.input = batch.len();
        if !self.config.novelty_enabled {
            stats.novelty.skipped = true;
            return (batch, vectors);
        }

        let novelty = NoveltyFilter::new(self.history_vectors(engine), self.config.novelty_threshold);
        stats.history_size = novelty.history_size();

        let keep = novelty.novel_indices(&vectors);
        stats.novelty.rejected = batch.len() - keep.len();
        (select(batch, &keep), vectors.select(Axis(0), &keep))
    }

    fn diversity_stage(
        &self,
        stats: &mut FilterStats,
        batch: Vec<Suggestion>,
        vectors: Array2<f32>,
    ) -> (Vec<Suggestion>, Array2<f32>) {
        stats.diversity.input = batch.len();
        if !self.config.diversity_enabled {
            stats.diversity.skipped = true;
            return (batch, vectors);
        }

        let keep = self.diversity.keep_indices(&vectors);
        stats.diversity.rejected = batch.len() - keep.len();
        (select(batch, &keep), vectors.select(Axis(0), &keep))
    }
}

/// Apply a stage if enabled and record its counts
fn run_stage<F>(
    stats: &mut FilterStats,
    stage: FilterStage,
    enabled: bool,
    batch: Vec<Suggestion>,
    apply: F,
) -> Result<Vec<Suggestion>>
where
    F: FnOnce(Vec<Suggestion>) -> Result<Vec<Suggestion>>,
{
    let input = batch.len();
    let entry = stats.stage_mut(stage);
    entry.input = input;

    if !enabled {
        entry.skipped = true;
        return Ok(batch);
    }

    let kept = apply(batch)?;
    stats.stage_mut(stage).rejected = input - kept.len();
    Ok(kept)
}

/// Keep the items at ascending `indices`
fn select(items: Vec<Suggestion>, indices: &[usize]) -> Vec<Suggestion> {
    let mut wanted = indices.iter().copied().peekable();
    items
        .into_iter()
        .enumerate()
        .filter(|(idx, _)| {
            if wanted.peek() == Some(idx) {
                wanted.next();
                true
            } else {
                false
            }
        })
        .map(|(_, item)| item)
        .collect()
}
