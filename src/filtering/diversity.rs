// Diversity stage: drop near-duplicates within one batch
// Small batches use a direct pairwise pass; large ones a density clustering pass
use crate::query::dbscan;
use ndarray::{Array2, Axis};

pub struct DiversityFilter {
    threshold: f32,
    cluster_above: usize,
}

impl DiversityFilter {
    /// # Arguments
    /// * `threshold` - Similarity at or above which two suggestions are duplicates
    /// * `cluster_above` - Batch size beyond which clustering replaces the pairwise pass
    pub fn new(threshold: f32, cluster_above: usize) -> Self {
        Self {
            threshold,
            cluster_above,
        }
    }

    /// Indices to keep, ascending; the earliest member of each duplicate group survives
    ///
    /// `vectors` must hold unit-length rows.
    pub fn keep_indices(&self, vectors: &Array2<f32>) -> Vec<usize> {
        if vectors.nrows() > self.cluster_above {
            self.keep_by_clustering(vectors)
        } else {
            self.keep_pairwise(vectors)
        }
    }

    fn keep_pairwise(&self, vectors: &Array2<f32>) -> Vec<usize> {
        let mut kept: Vec<usize> = Vec::new();
        for (idx, row) in vectors.axis_iter(Axis(0)).enumerate() {
            let duplicate = kept
                .iter()
                .any(|&k| vectors.row(k).dot(&row) >= self.threshold);
            if !duplicate {
                kept.push(idx);
            }
        }
        kept
    }

    /// Keep noise points plus the first member of every cluster
    ///
    /// With `min_samples = 2`, any two points at or above the threshold share
    /// a cluster, so survivors are pairwise below it.
    fn keep_by_clustering(&self, vectors: &Array2<f32>) -> Vec<usize> {
        let labels = dbscan(vectors, 1.0 - self.threshold, 2);
        let mut seen_clusters = std::collections::HashSet::new();

        let kept: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, label)| match label {
                Some(cluster) => seen_clusters.insert(*cluster),
                None => true,
            })
            .map(|(idx, _)| idx)
            .collect();

        tracing::debug!(
            "Diversity clustering kept {} of {} suggestions",
            kept.len(),
            vectors.nrows()
        );
        kept
    }
}
