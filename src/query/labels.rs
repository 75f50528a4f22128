// Cluster labelling
// Frequent n-grams from member text, re-ranked against the cluster centroid
// with a maximal-marginal-relevance diversity penalty
use super::QueryEngine;
use crate::embedding::cosine_similarity;
use crate::error::{GeistError, Result};
use ahash::{HashMap, HashMapExt, HashSet, HashSetExt};

const STOPWORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be", "because",
    "been", "but", "by", "can", "could", "did", "do", "does", "for", "from", "had", "has", "have",
    "he", "her", "his", "how", "i", "if", "in", "into", "is", "it", "its", "just", "like", "may",
    "me", "more", "most", "my", "no", "not", "of", "on", "one", "only", "or", "other", "our",
    "out", "over", "she", "should", "so", "some", "such", "than", "that", "the", "their", "them",
    "then", "there", "these", "they", "this", "those", "to", "up", "us", "very", "was", "we",
    "were", "what", "when", "where", "which", "who", "why", "will", "with", "would", "you",
    "your",
];

const MAX_NGRAM: usize = 3;

fn is_stopword(word: &str) -> bool {
    STOPWORDS.binary_search(&word).is_ok()
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Most frequent 1-3 word phrases across `texts`
///
/// Frequency is the number of texts containing the phrase. Phrases may not
/// start or end with a stopword; single words need at least three
/// characters. Ties rank longer phrases first, then alphabetically.
pub fn candidate_phrases(texts: &[String], limit: usize) -> Vec<String> {
    let mut document_frequency: HashMap<String, usize> = HashMap::new();

    for text in texts {
        let tokens = tokenize(text);
        let mut seen: HashSet<String> = HashSet::new();

        for n in 1..=MAX_NGRAM {
            for window in tokens.windows(n) {
                let first = &window[0];
                let last = &window[n - 1];
                if is_stopword(first) || is_stopword(last) {
                    continue;
                }
                if n == 1 && (first.chars().count() < 3 || first.chars().all(char::is_numeric)) {
                    continue;
                }
                seen.insert(window.join(" "));
            }
        }

        for phrase in seen {
            *document_frequency.entry(phrase).or_insert(0) += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> = document_frequency.into_iter().collect();
    ranked.sort_by(|a, b| {
        b.1.cmp(&a.1)
            .then_with(|| word_count(&b.0).cmp(&word_count(&a.0)))
            .then_with(|| a.0.cmp(&b.0))
    });
    ranked.truncate(limit);
    ranked.into_iter().map(|(phrase, _)| phrase).collect()
}

fn word_count(phrase: &str) -> usize {
    phrase.split(' ').count()
}

/// Greedy maximal marginal relevance selection
///
/// # Arguments
/// * `vectors` - Candidate embeddings
/// * `relevance` - Similarity of each candidate to the query (centroid)
/// * `k` - Number of candidates to select
/// * `lambda` - 1.0 ranks purely by relevance, 0.0 purely by novelty
///
/// # Returns
/// Indices into `vectors`, in selection order
pub fn mmr_select(vectors: &[Vec<f32>], relevance: &[f32], k: usize, lambda: f32) -> Vec<usize> {
    let mut selected: Vec<usize> = Vec::new();
    let mut remaining: Vec<usize> = (0..vectors.len().min(relevance.len())).collect();

    while selected.len() < k && !remaining.is_empty() {
        let mut best: Option<(usize, f32)> = None;

        for (pos, &candidate) in remaining.iter().enumerate() {
            let redundancy = selected
                .iter()
                .map(|&s| cosine_similarity(&vectors[candidate], &vectors[s]))
                .fold(0.0_f32, f32::max);
            let score = lambda * relevance[candidate] - (1.0 - lambda) * redundancy;

            // Strictly greater keeps the earlier candidate on ties
            if best.map_or(true, |(_, b)| score > b) {
                best = Some((pos, score));
            }
        }

        match best {
            Some((pos, _)) => selected.push(remaining.remove(pos)),
            None => break,
        }
    }

    selected
}

impl QueryEngine {
    /// Short phrase label for a cluster, or `"Cluster {id}"` on any failure
    pub(crate) fn label_cluster(&self, cluster_id: usize, members: &[usize]) -> String {
        match self.rank_label_terms(members) {
            Ok(terms) if !terms.is_empty() => terms.join(", "),
            Ok(_) => {
                tracing::debug!("No label terms for cluster {}", cluster_id);
                format!("Cluster {}", cluster_id)
            }
            Err(e) => {
                tracing::warn!("Label ranking failed for cluster {}: {}", cluster_id, e);
                format!("Cluster {}", cluster_id)
            }
        }
    }

    fn rank_label_terms(&self, members: &[usize]) -> Result<Vec<String>> {
        let texts: Vec<String> = members
            .iter()
            .filter_map(|&idx| self.note_at(idx))
            .map(|note| note.embeddable_text())
            .collect();

        let candidates = candidate_phrases(&texts, self.config.label_candidates);
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let centroid = self.semantic_centroid(members)?;
        let vectors = self.computer.embed_texts(&candidates)?;
        let relevance: Vec<f32> = vectors
            .iter()
            .map(|v| cosine_similarity(v, &centroid))
            .collect();

        let picked = mmr_select(
            &vectors,
            &relevance,
            self.config.label_terms,
            self.config.label_diversity,
        );
        Ok(picked.into_iter().map(|i| candidates[i].clone()).collect())
    }

    /// Mean of the members' semantic sub-vectors
    fn semantic_centroid(&self, members: &[usize]) -> Result<Vec<f32>> {
        let vectors = self.session.vectors()?;
        let dim = self.computer.semantic_dim();
        if members.is_empty() || vectors.ncols() < dim {
            return Err(GeistError::Session(
                "Cluster centroid has no semantic component".to_string(),
            ));
        }

        let mut centroid = vec![0.0_f32; dim];
        for &idx in members {
            for (slot, value) in centroid.iter_mut().zip(vectors.row(idx).iter()) {
                *slot += value;
            }
        }
        let count = members.len() as f32;
        centroid.iter_mut().for_each(|v| *v /= count);

        if centroid.iter().all(|v| *v == 0.0) {
            return Err(GeistError::Session(
                "Cluster centroid is a zero vector".to_string(),
            ));
        }
        Ok(centroid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stopwords_sorted() {
        let mut sorted = STOPWORDS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, STOPWORDS);
    }

    #[test]
    fn test_candidate_phrases_by_document_frequency() {
        let texts = vec![
            "Espresso beans and the grinder".to_string(),
            "Grinder settings for espresso beans".to_string(),
            "Milk for the latte".to_string(),
        ];

        let phrases = candidate_phrases(&texts, 4);
        assert_eq!(phrases[0], "espresso beans");
        assert!(phrases.contains(&"beans".to_string()));
        assert!(phrases.contains(&"grinder".to_string()));
        assert!(!phrases.iter().any(|p| p.starts_with("the ") || p.ends_with(" for")));
    }

    #[test]
    fn test_candidate_phrases_skip_short_and_numeric() {
        let texts = vec!["ox 2024 go tea".to_string()];
        let phrases = candidate_phrases(&texts, 10);
        assert!(phrases.contains(&"tea".to_string()));
        assert!(!phrases.contains(&"ox".to_string()));
        assert!(!phrases.contains(&"2024".to_string()));
    }

    #[test]
    fn test_mmr_prefers_diverse_terms() {
        let vectors = vec![vec![1.0, 0.0], vec![0.99, 0.1], vec![0.0, 1.0]];
        let relevance = vec![0.9, 0.89, 0.6];

        assert_eq!(mmr_select(&vectors, &relevance, 2, 1.0), vec![0, 1]);
        assert_eq!(mmr_select(&vectors, &relevance, 2, 0.5), vec![0, 2]);
        assert_eq!(mmr_select(&vectors, &relevance, 10, 0.5).len(), 3);
        assert!(mmr_select(&[], &[], 3, 0.5).is_empty());
    }
}
