// Integration tests for the persisted embedding cache across sessions
use chrono::{NaiveDate, TimeZone, Utc};
use geistfabrik::config::EmbeddingConfig;
use geistfabrik::embedding::{
    EmbeddingComputer, EmbeddingError, EmbeddingProvider, HashingProvider, TEMPORAL_DIM,
};
use geistfabrik::notes::Note;
use geistfabrik::session::Session;
use geistfabrik::storage::StorageManager;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Wraps the hashing provider and records every text sent to the model
struct CountingProvider {
    inner: HashingProvider,
    calls: AtomicUsize,
    texts: Mutex<Vec<String>>,
}

impl CountingProvider {
    fn new() -> Self {
        Self {
            inner: HashingProvider::new(32),
            calls: AtomicUsize::new(0),
            texts: Mutex::new(Vec::new()),
        }
    }

    fn texts_seen(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }

    fn reset(&self) {
        self.calls.store(0, Ordering::SeqCst);
        self.texts.lock().unwrap().clear();
    }
}

impl EmbeddingProvider for CountingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts.lock().unwrap().push(text.to_string());
        self.inner.embed(text)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts.lock().unwrap().extend(texts.iter().cloned());
        self.inner.embed_batch(texts)
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

/// Same vectors as the hashing provider under a different model name
struct RenamedProvider(HashingProvider);

impl EmbeddingProvider for RenamedProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.0.embed(text)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.0.embed_batch(texts)
    }

    fn dimension(&self) -> usize {
        self.0.dimension()
    }

    fn model_name(&self) -> &str {
        "hashing-v2"
    }
}

fn notes(alpha_body: &str) -> Vec<Note> {
    let created = Utc.with_ymd_and_hms(2023, 11, 20, 9, 0, 0).unwrap();
    vec![
        Note::new("alpha.md", "Alpha", alpha_body, created),
        Note::new("beta.md", "Beta", "beta stays the same", created),
        Note::new("empty.md", "", "   ", created),
    ]
}

fn config() -> EmbeddingConfig {
    EmbeddingConfig {
        provider: "hashing".to_string(),
        dimension: 32,
        ..EmbeddingConfig::default()
    }
}

fn run_session(
    provider: &Arc<CountingProvider>,
    storage: &StorageManager,
    date: NaiveDate,
    alpha_body: &str,
) -> Session {
    let computer = EmbeddingComputer::new(
        provider.clone(),
        Some(storage.embeddings.clone()),
        &config(),
    );
    let mut session = Session::new(date, notes(alpha_body));
    session.compute_embeddings(&computer).unwrap();
    session
}

fn semantic(session: &Session, path: &str) -> Vec<f32> {
    let vector = session.embedding(path).unwrap();
    vector.iter().take(vector.len() - TEMPORAL_DIM).copied().collect()
}

fn temporal(session: &Session, path: &str) -> Vec<f32> {
    let vector = session.embedding(path).unwrap();
    vector.iter().skip(vector.len() - TEMPORAL_DIM).copied().collect()
}

#[test]
fn test_unchanged_notes_hit_cache_next_day() {
    let temp = TempDir::new().unwrap();
    let storage = StorageManager::open(&temp.path().join("geist.db")).unwrap();
    let provider = Arc::new(CountingProvider::new());

    let day1 = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
    let first = run_session(&provider, &storage, day1, "alpha content");
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    assert_eq!(first.compute_stats().computed, 2);
    assert_eq!(first.compute_stats().empty, 1);

    provider.reset();
    let day2 = day1.succ_opt().unwrap();
    let second = run_session(&provider, &storage, day2, "alpha content");

    // Zero model calls: everything came from the store
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    assert_eq!(second.compute_stats().cache_hits, 2);

    // Semantic part byte-identical, temporal part recomputed for the new date
    for path in ["alpha.md", "beta.md"] {
        assert_eq!(semantic(&first, path), semantic(&second, path));
        assert_ne!(temporal(&first, path), temporal(&second, path));
    }
}

#[test]
fn test_one_character_change_triggers_recompute() {
    let temp = TempDir::new().unwrap();
    let storage = StorageManager::open(&temp.path().join("geist.db")).unwrap();
    let provider = Arc::new(CountingProvider::new());
    let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();

    let first = run_session(&provider, &storage, date, "alpha content");
    provider.reset();
    let second = run_session(&provider, &storage, date, "alpha contents");

    let seen = provider.texts_seen();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].contains("alpha contents"));
    assert_eq!(second.compute_stats().cache_hits, 1);
    assert_ne!(semantic(&first, "alpha.md"), semantic(&second, "alpha.md"));
    assert_eq!(semantic(&first, "beta.md"), semantic(&second, "beta.md"));
}

#[test]
fn test_empty_note_is_zero_and_still_queryable() {
    let temp = TempDir::new().unwrap();
    let storage = StorageManager::open(&temp.path().join("geist.db")).unwrap();
    let provider = Arc::new(CountingProvider::new());
    let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();

    let session = run_session(&provider, &storage, date, "alpha content");
    assert!(semantic(&session, "empty.md").iter().all(|v| *v == 0.0));
    assert!(temporal(&session, "empty.md").iter().any(|v| *v != 0.0));
    assert!(provider
        .texts_seen()
        .iter()
        .all(|t| !t.trim().is_empty()));
}

#[test]
fn test_corrupt_cache_row_only_recomputes_that_note() {
    let temp = TempDir::new().unwrap();
    let storage = StorageManager::open(&temp.path().join("geist.db")).unwrap();
    let provider = Arc::new(CountingProvider::new());
    let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();

    let first = run_session(&provider, &storage, date, "alpha content");
    storage
        .database
        .get_conn()
        .unwrap()
        .execute(
            "UPDATE embeddings SET vector = 'not a blob' WHERE note_path = 'alpha.md'",
            [],
        )
        .unwrap();

    provider.reset();
    let second = run_session(&provider, &storage, date, "alpha content");

    let stats = second.compute_stats();
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(stats.computed, 1);
    assert_eq!(provider.texts_seen().len(), 1);
    assert_eq!(semantic(&first, "alpha.md"), semantic(&second, "alpha.md"));

    // The recomputed vector replaces the bad row
    provider.reset();
    let third = run_session(&provider, &storage, date, "alpha content");
    assert_eq!(third.compute_stats().cache_hits, 2);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_model_change_invalidates_cache() {
    let temp = TempDir::new().unwrap();
    let storage = StorageManager::open(&temp.path().join("geist.db")).unwrap();
    let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();

    let provider = Arc::new(CountingProvider::new());
    run_session(&provider, &storage, date, "alpha content");

    // Same content and dimension, different model: stored vectors must not be reused
    let other = EmbeddingComputer::new(
        Arc::new(RenamedProvider(HashingProvider::new(32))),
        Some(storage.embeddings.clone()),
        &config(),
    );
    let mut session = Session::new(date, notes("alpha content"));
    session.compute_embeddings(&other).unwrap();

    let stats = session.compute_stats();
    assert_eq!(stats.cache_hits, 0);
    assert_eq!(stats.computed, 2);
}

#[test]
fn test_sessions_are_recorded() {
    let temp = TempDir::new().unwrap();
    let storage = StorageManager::open(&temp.path().join("geist.db")).unwrap();
    let provider = Arc::new(CountingProvider::new());

    let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
    let session = run_session(&provider, &storage, date, "alpha content");
    session.record(&storage.database).unwrap();
    // Re-running a date replaces its record
    session.record(&storage.database).unwrap();

    let stats = storage.database.stats().unwrap();
    assert_eq!(stats.session_count, 1);
    assert_eq!(stats.embedding_count, 2);
}
