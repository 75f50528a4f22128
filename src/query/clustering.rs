// Density-based clustering over the session's vector array
// Noise points belong to no cluster; clusters are cached per minimum size
use super::QueryEngine;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A group of semantically dense notes with a short derived label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    /// Position in this session's cluster list; not stable across sessions
    pub cluster_id: usize,
    /// Member note paths in canonical order
    pub members: Vec<String>,
    pub label: String,
}

impl Cluster {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.members.iter().any(|m| m == path)
    }
}

/// DBSCAN on cosine distance over unit-length rows
///
/// # Arguments
/// * `unit` - Row-normalised vectors
/// * `eps` - Maximum cosine distance (`1 - similarity`) between neighbours
/// * `min_samples` - Neighbourhood size (including the point) that makes a core point
///
/// # Returns
/// Cluster number per row, `None` for noise. Points are visited in row
/// order, so the labelling is deterministic for a given input.
pub fn dbscan(unit: &Array2<f32>, eps: f32, min_samples: usize) -> Vec<Option<usize>> {
    let n = unit.nrows();
    let mut labels: Vec<Option<usize>> = vec![None; n];
    if n == 0 {
        return labels;
    }

    // One row of similarities per query; the full n x n matrix is never held
    let min_similarity = 1.0 - eps;
    let region = |i: usize| -> Vec<usize> {
        let similarity = unit.dot(&unit.row(i));
        (0..n)
            .filter(|&j| similarity[j] >= min_similarity)
            .collect()
    };

    let mut visited = vec![false; n];
    let mut next_cluster = 0;

    for point in 0..n {
        if visited[point] {
            continue;
        }
        visited[point] = true;

        let neighbours = region(point);
        if neighbours.len() < min_samples.max(1) {
            continue;
        }

        let cluster = next_cluster;
        next_cluster += 1;
        labels[point] = Some(cluster);

        let mut queue: VecDeque<usize> = neighbours.into_iter().collect();
        while let Some(q) = queue.pop_front() {
            if labels[q].is_none() {
                labels[q] = Some(cluster);
            }
            if visited[q] {
                continue;
            }
            visited[q] = true;

            let expansion = region(q);
            if expansion.len() >= min_samples.max(1) {
                queue.extend(expansion.into_iter().filter(|&r| !visited[r]));
            }
        }
    }

    labels
}

impl QueryEngine {
    /// Density clusters of at least `min_size` notes, labelled
    ///
    /// Computed once per `min_size` for the session. Label failures fall back
    /// to `"Cluster {id}"` and never fail the call.
    pub fn get_clusters(&self, min_size: usize) -> Vec<Cluster> {
        if let Some(cached) = self.clusters.borrow().get(&min_size) {
            return cached.clone();
        }

        let groups = self.cluster_groups(min_size);
        let clusters: Vec<Cluster> = groups
            .into_iter()
            .enumerate()
            .map(|(cluster_id, members)| Cluster {
                cluster_id,
                label: self.label_cluster(cluster_id, &members),
                members: members
                    .iter()
                    .filter_map(|&idx| self.note_at(idx).map(|n| n.path.clone()))
                    .collect(),
            })
            .collect();

        tracing::debug!(
            "Clustered {} notes into {} clusters (min_size={})",
            self.notes().len(),
            clusters.len(),
            min_size
        );

        self.clusters
            .borrow_mut()
            .insert(min_size, clusters.clone());
        clusters
    }

    /// The cluster containing `path`, using the configured minimum size
    pub fn cluster_of(&self, path: &str) -> Option<Cluster> {
        self.get_clusters(self.config.cluster_min_size)
            .into_iter()
            .find(|c| c.contains(path))
    }

    /// Member indices per cluster, ordered by each cluster's first member
    fn cluster_groups(&self, min_size: usize) -> Vec<Vec<usize>> {
        let labels = dbscan(self.unit(), self.config.cluster_eps, min_size);
        let count = labels.iter().flatten().max().map_or(0, |max| max + 1);

        let mut groups: Vec<Vec<usize>> = vec![Vec::new(); count];
        for (idx, label) in labels.iter().enumerate() {
            if let Some(cluster) = label {
                groups[*cluster].push(idx);
            }
        }

        groups.retain(|members| members.len() >= min_size.max(1));
        groups.sort_by_key(|members| members.first().copied());
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{engine_for, engine_with};
    use super::*;
    use crate::config::{EmbeddingConfig, QueryConfig};
    use crate::embedding::{EmbeddingComputer, EmbeddingError, EmbeddingProvider, HashingProvider};
    use crate::notes::Note;
    use chrono::{NaiveDate, TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Serves the session's note batch, then fails every later call
    struct FailAfterFirst {
        inner: HashingProvider,
        calls: AtomicUsize,
    }

    impl EmbeddingProvider for FailAfterFirst {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            self.inner.embed(text)
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                self.inner.embed_batch(texts)
            } else {
                Err(EmbeddingError::GenerationError("model unloaded".into()))
            }
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }

        fn model_name(&self) -> &str {
            self.inner.model_name()
        }
    }

    fn unit(rows: &[[f32; 2]]) -> Array2<f32> {
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        super::super::unit_rows(&Array2::from_shape_vec((rows.len(), 2), flat).unwrap())
    }

    #[test]
    fn test_dbscan_two_groups_and_noise() {
        let vectors = unit(&[
            [1.0, 0.0],
            [0.99, 0.05],
            [0.98, 0.1],
            [0.0, 1.0],
            [0.05, 0.99],
            [0.1, 0.98],
            [-1.0, 0.0],
        ]);

        let labels = dbscan(&vectors, 0.05, 3);
        assert_eq!(labels[0], Some(0));
        assert_eq!(labels[1], Some(0));
        assert_eq!(labels[2], Some(0));
        assert_eq!(labels[3], Some(1));
        assert_eq!(labels[5], Some(1));
        assert_eq!(labels[6], None);
    }

    #[test]
    fn test_dbscan_min_samples_marks_noise() {
        let vectors = unit(&[[1.0, 0.0], [0.0, 1.0]]);
        assert_eq!(dbscan(&vectors, 0.1, 2), vec![None, None]);
        assert!(dbscan(&Array2::zeros((0, 2)), 0.1, 2).is_empty());
    }

    fn clustered_notes() -> Vec<Note> {
        let created = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let mut notes = Vec::new();
        for i in 0..4 {
            notes.push(Note::new(
                format!("coffee{}.md", i),
                format!("coffee{}", i),
                "espresso coffee beans roast grinder crema",
                created,
            ));
            notes.push(Note::new(
                format!("rust{}.md", i),
                format!("rust{}", i),
                "rust ownership borrow checker lifetimes traits",
                created,
            ));
        }
        notes
    }

    #[test]
    fn test_get_clusters_cached_and_deterministic() {
        let engine = engine_for(clustered_notes());

        let clusters = engine.get_clusters(3);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].members[0], "coffee0.md");
        assert_eq!(clusters[0].len(), 4);
        assert!(clusters.iter().all(|c| !c.label.is_empty()));
        assert_eq!(engine.get_clusters(3), clusters);

        let again = engine_for(clustered_notes()).get_clusters(3);
        assert_eq!(again, clusters);
    }

    #[test]
    fn test_cluster_of_uses_configured_min_size() {
        let default_engine = engine_for(clustered_notes());
        assert!(default_engine.cluster_of("rust1.md").is_none());

        let config = QueryConfig {
            cluster_min_size: 3,
            ..QueryConfig::default()
        };
        let engine = engine_with(clustered_notes(), config);
        let cluster = engine.cluster_of("rust1.md").unwrap();
        assert!(cluster.contains("rust3.md"));
        assert!(!cluster.contains("coffee0.md"));
        assert!(engine.cluster_of("missing.md").is_none());
    }

    #[test]
    fn test_label_failure_falls_back_to_cluster_id() {
        let provider = Arc::new(FailAfterFirst {
            inner: HashingProvider::new(256),
            calls: AtomicUsize::new(0),
        });
        let computer = Arc::new(EmbeddingComputer::new(
            provider.clone(),
            None,
            &EmbeddingConfig::default(),
        ));
        let engine = QueryEngine::build(
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            clustered_notes(),
            computer,
            QueryConfig::default(),
        )
        .unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        let clusters = engine.get_clusters(3);
        let labels: Vec<&str> = clusters.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["Cluster 0", "Cluster 1"]);
        assert_eq!(clusters[0].len(), 4);
        // Ranking reached the model and failed there
        assert!(provider.calls.load(Ordering::SeqCst) > 1);

        let healthy = engine_for(clustered_notes()).get_clusters(3);
        assert!(healthy.iter().all(|c| !c.label.starts_with("Cluster ")));
    }
}
