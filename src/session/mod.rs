//! Session management
//!
//! A session is one analysis run anchored to a date. It owns the canonical note
//! ordering and the dense vector array for that date; the array lives exactly
//! as long as the session.
use crate::embedding::{ComputeStats, EmbeddingComputer};
use crate::error::{GeistError, Result};
use crate::notes::{Note, NoteSet};
use crate::storage::Database;
use chrono::{Datelike, NaiveDate};
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session lifecycle. There is no transition back to an earlier state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Notes loaded, vectors not yet computed
    Uninitialized,
    /// Vector array materialised; queries may run
    EmbeddingReady,
    /// Vectors released; the session can no longer answer queries
    Discarded,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::EmbeddingReady => "embedding-ready",
            Self::Discarded => "discarded",
        }
    }
}

/// One analysis run over a note set
#[derive(Debug)]
pub struct Session {
    /// Unique session identifier
    pub id: Uuid,

    /// Session date; anchors temporal features
    pub date: NaiveDate,

    /// Derived from `date`; seeds all sampling
    pub seed: u64,

    state: SessionState,
    notes: NoteSet,
    vectors: Array2<f32>,
    stats: ComputeStats,
}

impl Session {
    /// Create a session over `notes` for `date`
    pub fn new(date: NaiveDate, notes: Vec<Note>) -> Self {
        Self {
            id: Uuid::new_v4(),
            date,
            seed: Self::seed_for_date(date),
            state: SessionState::Uninitialized,
            notes: NoteSet::new(notes),
            vectors: Array2::zeros((0, 0)),
            stats: ComputeStats::default(),
        }
    }

    /// Deterministic seed: the date as a `YYYYMMDD` integer
    pub fn seed_for_date(date: NaiveDate) -> u64 {
        let year = u64::try_from(date.year()).unwrap_or(0);
        year * 10_000 + u64::from(date.month()) * 100 + u64::from(date.day())
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Compute (or load from cache) vectors for every note
    pub fn compute_embeddings(&mut self, computer: &EmbeddingComputer) -> Result<&ComputeStats> {
        self.expect_state(SessionState::Uninitialized)?;

        let outcome = computer.compute(self.notes.notes(), self.date)?;
        let dim = computer.vector_dim();
        let rows = outcome.vectors.len();
        let flat: Vec<f32> = outcome.vectors.into_iter().flatten().collect();

        self.vectors = Array2::from_shape_vec((rows, dim), flat).map_err(|e| {
            GeistError::Session(format!("Vector array has inconsistent shape: {}", e))
        })?;
        self.stats = outcome.stats;
        self.state = SessionState::EmbeddingReady;

        tracing::info!(
            "Session {} ({}) ready with {} notes",
            self.id,
            self.date,
            rows
        );

        Ok(&self.stats)
    }

    /// Record this session in the database's audit table
    pub fn record(&self, db: &Database) -> Result<()> {
        db.record_session(
            &self.id.to_string(),
            &self.date.format("%Y-%m-%d").to_string(),
            self.seed,
            self.notes.len(),
        )
    }

    /// Release the vector array; the session is unusable afterwards
    pub fn discard(&mut self) {
        self.vectors = Array2::zeros((0, 0));
        self.state = SessionState::Discarded;
        tracing::debug!("Session {} discarded", self.id);
    }

    /// Canonical ordered note list
    pub fn notes(&self) -> &[Note] {
        self.notes.notes()
    }

    pub fn note_set(&self) -> &NoteSet {
        &self.notes
    }

    pub fn compute_stats(&self) -> &ComputeStats {
        &self.stats
    }

    /// The full `notes × (semantic + temporal)` array
    pub fn vectors(&self) -> Result<&Array2<f32>> {
        self.expect_state(SessionState::EmbeddingReady)?;
        Ok(&self.vectors)
    }

    /// Vector of the note at `index` in canonical order
    pub fn vector(&self, index: usize) -> Option<ArrayView1<'_, f32>> {
        if self.state != SessionState::EmbeddingReady || index >= self.vectors.nrows() {
            return None;
        }
        Some(self.vectors.row(index))
    }

    /// Vector of the note at `path`
    pub fn embedding(&self, path: &str) -> Option<ArrayView1<'_, f32>> {
        self.notes.index_of(path).and_then(|idx| self.vector(idx))
    }

    fn expect_state(&self, expected: SessionState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(GeistError::InvalidState {
                expected: expected.as_str(),
                actual: self.state.as_str(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingConfig;
    use crate::embedding::HashingProvider;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn notes() -> Vec<Note> {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        vec![
            Note::new("b.md", "B", "beta content", created),
            Note::new("a.md", "A", "alpha content", created),
        ]
    }

    fn computer() -> EmbeddingComputer {
        EmbeddingComputer::new(
            Arc::new(HashingProvider::new(16)),
            None,
            &EmbeddingConfig::default(),
        )
    }

    #[test]
    fn test_seed_from_date() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(Session::seed_for_date(date), 20240315);
    }

    #[test]
    fn test_lifecycle() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let mut session = Session::new(date, notes());
        assert_eq!(session.state(), SessionState::Uninitialized);
        assert!(session.vectors().is_err());

        session.compute_embeddings(&computer()).unwrap();
        assert_eq!(session.state(), SessionState::EmbeddingReady);
        assert_eq!(session.vectors().unwrap().dim(), (2, 19));
        assert_eq!(session.notes()[0].path, "a.md");
        assert!(session.embedding("b.md").is_some());

        // No second computation within the same session
        assert!(matches!(
            session.compute_embeddings(&computer()),
            Err(GeistError::InvalidState { .. })
        ));

        session.discard();
        assert_eq!(session.state(), SessionState::Discarded);
        assert!(session.embedding("a.md").is_none());
    }

    #[test]
    fn test_empty_note_set() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let mut session = Session::new(date, Vec::new());
        session.compute_embeddings(&computer()).unwrap();
        assert_eq!(session.vectors().unwrap().nrows(), 0);
    }
}
