//! Semantic queries over the session's vector array
//!
//! Single-pair, batch and neighbour queries all read and populate the same
//! pairwise memo, so a score is computed once per session and every entry
//! point reports the identical value for a pair afterwards.

use super::QueryEngine;
use crate::error::Result;
use crate::notes::Note;
use ahash::HashSet;
use ndarray::{Array2, ArrayView1};

/// Scale every row to unit length; zero rows stay zero
pub fn unit_rows(matrix: &Array2<f32>) -> Array2<f32> {
    let mut unit = matrix.clone();
    for mut row in unit.rows_mut() {
        let norm = row.dot(&row).sqrt();
        if norm > 0.0 {
            row /= norm;
        }
    }
    unit
}

/// Cosine similarity of every row of `a` against every row of `b`
pub fn similarity_matrix(a: &Array2<f32>, b: &Array2<f32>) -> Array2<f32> {
    unit_rows(a).dot(&unit_rows(b).t())
}

/// Pack equal-length vectors into a row matrix
pub fn stack_rows(rows: &[Vec<f32>], dim: usize) -> Array2<f32> {
    Array2::from_shape_fn((rows.len(), dim), |(i, j)| {
        rows[i].get(j).copied().unwrap_or(0.0)
    })
}

fn pair_key(a: usize, b: usize) -> (usize, usize) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl QueryEngine {
    /// Unit-length rows of the session array, built on first use
    pub(super) fn unit(&self) -> &Array2<f32> {
        self.unit.get_or_init(|| match self.session.vectors() {
            Ok(vectors) => unit_rows(vectors),
            Err(e) => {
                tracing::warn!("Session vectors unavailable: {}", e);
                Array2::zeros((0, 0))
            }
        })
    }

    fn unit_row(&self, idx: usize) -> Option<ArrayView1<'_, f32>> {
        let unit = self.unit();
        (idx < unit.nrows()).then(|| unit.row(idx))
    }

    /// Cosine similarity between two notes; 0.0 when either is unknown
    pub fn similarity(&self, a: &str, b: &str) -> f32 {
        match (self.index_of(a), self.index_of(b)) {
            (Some(a), Some(b)) => self.similarity_by_index(a, b),
            _ => 0.0,
        }
    }

    pub(crate) fn similarity_by_index(&self, a: usize, b: usize) -> f32 {
        let key = pair_key(a, b);
        if let Some(score) = self.similarity_memo.borrow().get(&key) {
            return *score;
        }

        let score = self.pair_score(key);
        self.similarity_memo.borrow_mut().insert(key, score);
        score
    }

    /// The one place a pair's score is computed
    ///
    /// Every entry point goes through here with the key in `(min, max)` order.
    fn pair_score(&self, key: (usize, usize)) -> f32 {
        match (self.unit_row(key.0), self.unit_row(key.1)) {
            (Some(x), Some(y)) => x.dot(&y),
            _ => 0.0,
        }
    }

    /// Memoised score if present, otherwise a fresh one (not stored)
    fn peek_score(&self, a: usize, b: usize) -> f32 {
        let key = pair_key(a, b);
        let cached = self.similarity_memo.borrow().get(&key).copied();
        cached.unwrap_or_else(|| self.pair_score(key))
    }

    /// `|a| × |b|` similarity matrix; cells already in the memo are reused
    ///
    /// Rows or columns for unknown paths are zero.
    pub fn batch_similarity(&self, a: &[&str], b: &[&str]) -> Array2<f32> {
        let rows: Vec<Option<usize>> = a.iter().map(|p| self.index_of(p)).collect();
        let cols: Vec<Option<usize>> = b.iter().map(|p| self.index_of(p)).collect();
        self.pair_scores(&rows, &cols)
    }

    /// Core of batch similarity over note indices; fills the memo as it goes
    pub(crate) fn pair_scores(
        &self,
        rows: &[Option<usize>],
        cols: &[Option<usize>],
    ) -> Array2<f32> {
        let mut out = Array2::zeros((rows.len(), cols.len()));
        for (i, row) in rows.iter().enumerate() {
            let Some(r) = row else { continue };
            for (j, col) in cols.iter().enumerate() {
                let Some(c) = col else { continue };
                out[[i, j]] = self.similarity_by_index(*r, *c);
            }
        }
        out
    }

    /// Top `k` most similar notes, excluding `path` itself
    pub fn neighbours(&self, path: &str, k: usize) -> Vec<&Note> {
        self.neighbours_with_scores(path, k)
            .into_iter()
            .map(|(note, _)| note)
            .collect()
    }

    /// Top `k` neighbours with their similarity scores
    ///
    /// Ties are broken by path. Returned scores are memoised, so a later
    /// `similarity` call for the same pair returns the same value.
    pub fn neighbours_with_scores(&self, path: &str, k: usize) -> Vec<(&Note, f32)> {
        let Some(idx) = self.index_of(path) else {
            tracing::debug!("Neighbour query for unknown note {}", path);
            return Vec::new();
        };
        if k == 0 || self.unit_row(idx).is_none() {
            return Vec::new();
        }

        let mut ranked: Vec<(usize, f32)> = (0..self.notes().len())
            .filter(|&j| j != idx)
            .map(|j| (j, self.peek_score(idx, j)))
            .collect();

        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(k);

        let mut memo = self.similarity_memo.borrow_mut();
        for (j, score) in &ranked {
            memo.entry(pair_key(idx, *j)).or_insert(*score);
        }
        drop(memo);

        ranked
            .into_iter()
            .filter_map(|(j, score)| self.note_at(j).map(|n| (n, score)))
            .collect()
    }

    /// Top `k` most similar note pairs with no resolved link between them
    ///
    /// Large note sets are first reduced to `candidate_limit` notes: the most
    /// recently modified half plus a seeded sample of the rest.
    pub fn unlinked_pairs(&self, k: usize, candidate_limit: usize) -> Vec<(&Note, &Note, f32)> {
        let candidates = self.unlinked_candidates(candidate_limit);
        if candidates.len() < 2 || k == 0 {
            return Vec::new();
        }

        let linked = self.graph().linked_pairs();
        let indices: Vec<Option<usize>> = candidates.iter().copied().map(Some).collect();
        let scores = self.pair_scores(&indices, &indices);
        let floor = self.config.unlinked_min_similarity;

        let mut pairs: Vec<(usize, usize, f32)> = Vec::new();
        for i in 0..candidates.len() {
            for j in (i + 1)..candidates.len() {
                let key = pair_key(candidates[i], candidates[j]);
                if linked.contains(&key) {
                    continue;
                }
                let score = scores[[i, j]];
                if score >= floor {
                    pairs.push((key.0, key.1, score));
                }
            }
        }

        pairs.sort_by(|a, b| {
            b.2.total_cmp(&a.2)
                .then(a.0.cmp(&b.0))
                .then(a.1.cmp(&b.1))
        });
        pairs.truncate(k);

        pairs
            .into_iter()
            .filter_map(|(a, b, score)| Some((self.note_at(a)?, self.note_at(b)?, score)))
            .collect()
    }

    /// Ascending note indices considered by `unlinked_pairs`
    fn unlinked_candidates(&self, limit: usize) -> Vec<usize> {
        let n = self.notes().len();
        if n <= limit {
            return (0..n).collect();
        }

        let recent = self.recent_indices(limit / 2);
        let taken: HashSet<usize> = recent.iter().copied().collect();
        let remaining: Vec<usize> = (0..n).filter(|i| !taken.contains(i)).collect();

        let mut candidates = recent;
        candidates.extend(self.sample(&remaining, limit - candidates.len()));
        candidates.sort_unstable();

        tracing::debug!(
            "Unlinked pair search bounded to {} of {} notes",
            candidates.len(),
            n
        );
        candidates
    }

    /// Semantic vectors for arbitrary texts
    pub fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.computer.embed_texts(texts)
    }

    /// Width of the semantic part of each note vector
    pub fn semantic_dim(&self) -> usize {
        self.computer.semantic_dim()
    }
}
