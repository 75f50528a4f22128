// Novelty stage: reject suggestions too close to recently emitted ones
use ndarray::{Array2, ArrayView1};

/// Compares candidates against the history window embedded once per run
pub struct NoveltyFilter {
    /// Unit-length history vectors, one row per historical text
    history: Array2<f32>,
    threshold: f32,
}

impl NoveltyFilter {
    /// # Arguments
    /// * `history` - Unit-length semantic vectors of the lookback window's texts
    /// * `threshold` - Similarity at or above which a candidate is stale
    pub fn new(history: Array2<f32>, threshold: f32) -> Self {
        Self { history, threshold }
    }

    pub fn history_size(&self) -> usize {
        self.history.nrows()
    }

    /// Whether `candidate` (unit length) is novel
    ///
    /// Stops at the first historical text at or above the threshold.
    pub fn is_novel(&self, candidate: ArrayView1<'_, f32>) -> bool {
        if candidate.len() != self.history.ncols() {
            return true;
        }
        !self
            .history
            .rows()
            .into_iter()
            .any(|past| past.dot(&candidate) >= self.threshold)
    }

    /// Indices of novel rows in `candidates`, ascending
    pub fn novel_indices(&self, candidates: &Array2<f32>) -> Vec<usize> {
        candidates
            .rows()
            .into_iter()
            .enumerate()
            .filter(|(_, row)| self.is_novel(row.view()))
            .map(|(idx, _)| idx)
            .collect()
    }
}
