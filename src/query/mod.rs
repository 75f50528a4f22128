//! Query engine over one embedding-ready session
//!
//! Graph queries, semantic queries and clustering share one set of
//! session-scoped caches owned by the engine:
//! - resolved link graph (built on first graph query)
//! - unit-normalised vector matrix
//! - pairwise similarity memo (shared by single, batch and neighbour queries)
//! - clusters with labels, per minimum size
//!
//! The engine is single-threaded; caches use interior mutability so plugins
//! can call back into it re-entrantly through `&QueryEngine`.

mod clustering;
mod extensions;
mod graph;
mod labels;
mod semantic;

pub use clustering::{dbscan, Cluster};
pub use extensions::{ExtensionRegistry, Metadata, MetadataInferrer, QueryFunction};
pub use graph::{GraphStats, LinkGraph};
pub use labels::{candidate_phrases, mmr_select};
pub use semantic::{similarity_matrix, stack_rows, unit_rows};

use crate::config::QueryConfig;
use crate::embedding::EmbeddingComputer;
use crate::error::{GeistError, Result};
use crate::notes::{Link, Note};
use crate::session::{Session, SessionState};
use ahash::HashMap;
use ndarray::Array2;
use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::cell::{OnceCell, RefCell};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Query engine bound to one session for its whole lifetime
pub struct QueryEngine {
    session: Session,
    computer: Arc<EmbeddingComputer>,
    config: QueryConfig,
    extensions: ExtensionRegistry,

    graph: OnceCell<LinkGraph>,
    unit: OnceCell<Array2<f32>>,
    /// Keyed by `(min, max)` note index so lookups are order independent
    similarity_memo: RefCell<HashMap<(usize, usize), f32>>,
    clusters: RefCell<BTreeMap<usize, Vec<Cluster>>>,
}

impl QueryEngine {
    /// Wrap an embedding-ready session
    pub fn new(
        session: Session,
        computer: Arc<EmbeddingComputer>,
        config: QueryConfig,
    ) -> Result<Self> {
        if session.state() != SessionState::EmbeddingReady {
            return Err(GeistError::InvalidState {
                expected: SessionState::EmbeddingReady.as_str(),
                actual: session.state().as_str(),
            });
        }

        Ok(Self {
            session,
            computer,
            config,
            extensions: ExtensionRegistry::default(),
            graph: OnceCell::new(),
            unit: OnceCell::new(),
            similarity_memo: RefCell::new(HashMap::default()),
            clusters: RefCell::new(BTreeMap::new()),
        })
    }

    /// Create a session for `date`, compute its vectors and wrap it
    pub fn build(
        date: chrono::NaiveDate,
        notes: Vec<Note>,
        computer: Arc<EmbeddingComputer>,
        config: QueryConfig,
    ) -> Result<Self> {
        let mut session = Session::new(date, notes);
        session.compute_embeddings(&computer)?;
        Self::new(session, computer, config)
    }

    /// Attach metadata inferrers and query functions
    pub fn with_extensions(mut self, extensions: ExtensionRegistry) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Release the engine and discard its session
    pub fn into_session(self) -> Session {
        let mut session = self.session;
        session.discard();
        session
    }

    // ---- notes ----

    /// Canonical ordered note list, computed once per session
    pub fn notes(&self) -> &[Note] {
        self.session.notes()
    }

    pub fn get_note(&self, path: &str) -> Option<&Note> {
        self.session.note_set().by_path(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index_of(path).is_some()
    }

    /// Resolve a textual link target against the note set
    pub fn resolve_link_target(&self, target: &str) -> Option<&Note> {
        self.session
            .note_set()
            .resolve(target)
            .and_then(|idx| self.note_at(idx))
    }

    /// `k` most recently modified notes; ties by path
    pub fn recent_notes(&self, k: usize) -> Vec<&Note> {
        self.recent_indices(k)
            .into_iter()
            .filter_map(|idx| self.note_at(idx))
            .collect()
    }

    /// `k` least recently modified notes; ties by path
    pub fn old_notes(&self, k: usize) -> Vec<&Note> {
        let mut order: Vec<usize> = (0..self.notes().len()).collect();
        order.sort_by(|&a, &b| {
            self.notes()[a]
                .modified
                .cmp(&self.notes()[b].modified)
                .then(a.cmp(&b))
        });
        order.truncate(k);
        order.into_iter().filter_map(|idx| self.note_at(idx)).collect()
    }

    /// `k` notes chosen through the session's seeded sampler
    pub fn random_notes(&self, k: usize) -> Vec<&Note> {
        let all: Vec<&Note> = self.notes().iter().collect();
        self.sample(&all, k)
    }

    pub fn notes_with_tag(&self, tag: &str) -> Vec<&Note> {
        self.notes().iter().filter(|n| n.tags.contains(tag)).collect()
    }

    /// Deterministic selection of `k` items
    ///
    /// Identical `(seed, items, k)` always yields identical output. Items come
    /// back in sampled order.
    pub fn sample<T: Clone>(&self, items: &[T], k: usize) -> Vec<T> {
        let amount = k.min(items.len());
        if amount == 0 {
            return Vec::new();
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.sample_seed(items.len(), k));
        index::sample(&mut rng, items.len(), amount)
            .into_iter()
            .map(|i| items[i].clone())
            .collect()
    }

    fn sample_seed(&self, len: usize, k: usize) -> u64 {
        self.session.seed
            ^ (len as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
            ^ (k as u64).rotate_left(32)
    }

    // ---- graph ----

    fn graph(&self) -> &LinkGraph {
        self.graph
            .get_or_init(|| LinkGraph::build(self.session.note_set()))
    }

    /// Notes linking to `path`
    pub fn backlinks(&self, path: &str) -> Vec<&Note> {
        self.graph_lookup(path, |graph, idx| graph.incoming(idx).to_vec())
    }

    /// Notes `path` links to (resolved targets only)
    pub fn outgoing_links(&self, path: &str) -> Vec<&Note> {
        self.graph_lookup(path, |graph, idx| graph.outgoing(idx).to_vec())
    }

    /// Notes linked with `path` in either direction
    pub fn graph_neighbors(&self, path: &str) -> Vec<&Note> {
        self.graph_lookup(path, |graph, idx| graph.neighbors(idx))
    }

    /// Whether `a` and `b` are linked in either direction
    pub fn has_link(&self, a: &str, b: &str) -> bool {
        match (self.index_of(a), self.index_of(b)) {
            (Some(a), Some(b)) => self.graph().has_link(a, b),
            _ => false,
        }
    }

    /// Top `k` notes by resolved in-degree
    pub fn hubs(&self, k: usize) -> Vec<&Note> {
        self.hubs_with_counts(k).into_iter().map(|(n, _)| n).collect()
    }

    pub fn hubs_with_counts(&self, k: usize) -> Vec<(&Note, usize)> {
        self.graph()
            .hubs(k)
            .into_iter()
            .filter_map(|(idx, count)| self.note_at(idx).map(|n| (n, count)))
            .collect()
    }

    /// Notes with no resolved links in either direction
    pub fn orphans(&self) -> Vec<&Note> {
        self.graph()
            .orphans()
            .into_iter()
            .filter_map(|idx| self.note_at(idx))
            .collect()
    }

    /// Links whose target resolves to no note
    pub fn dangling_links(&self) -> Vec<&Link> {
        let notes = self.notes();
        let mut links = Vec::new();
        for (source, target) in self.graph().dangling() {
            if let Some(link) = notes[*source].links.iter().find(|l| &l.target == target) {
                links.push(link);
            }
        }
        links.dedup_by(|a, b| a.source_path == b.source_path && a.target == b.target);
        links
    }

    pub fn graph_stats(&self) -> GraphStats {
        self.graph().stats()
    }

    fn graph_lookup<F>(&self, path: &str, f: F) -> Vec<&Note>
    where
        F: Fn(&LinkGraph, usize) -> Vec<usize>,
    {
        let Some(idx) = self.index_of(path) else {
            tracing::debug!("Graph query for unknown note {}", path);
            return Vec::new();
        };
        f(self.graph(), idx)
            .into_iter()
            .filter_map(|i| self.note_at(i))
            .collect()
    }

    // ---- extensions ----

    /// Built-in metadata merged with every registered inferrer's output
    ///
    /// Inferrer failures are logged and skipped; built-in keys win on conflict.
    /// Calling this never touches the engine's caches.
    pub fn metadata(&self, path: &str) -> Metadata {
        let Some(note) = self.get_note(path) else {
            return Metadata::new();
        };

        let mut metadata = self.builtin_metadata(note);
        for inferrer in self.extensions.inferrers() {
            match inferrer.infer(note, self) {
                Ok(values) => {
                    for (key, value) in values {
                        if metadata.contains_key(&key) {
                            tracing::debug!(
                                "Inferrer {} tried to override built-in key {}",
                                inferrer.name(),
                                key
                            );
                            continue;
                        }
                        metadata.insert(key, value);
                    }
                }
                Err(e) => tracing::warn!(
                    "Metadata inferrer {} failed for {}: {}",
                    inferrer.name(),
                    path,
                    e
                ),
            }
        }
        metadata
    }

    fn builtin_metadata(&self, note: &Note) -> Metadata {
        let age_days = (self.session.date - note.created.date_naive()).num_days();
        let mut metadata = Metadata::new();
        metadata.insert("word_count".into(), note.word_count().into());
        metadata.insert("link_count".into(), note.links.len().into());
        metadata.insert(
            "backlink_count".into(),
            self.backlinks(&note.path).len().into(),
        );
        metadata.insert("tag_count".into(), note.tags.len().into());
        metadata.insert("age_days".into(), age_days.into());
        metadata
    }

    /// Invoke a registered query function
    pub fn call(&self, name: &str, args: &[serde_json::Value]) -> Result<serde_json::Value> {
        let function = self
            .extensions
            .function(name)
            .ok_or_else(|| GeistError::Extension {
                name: name.to_string(),
                message: "no such function".to_string(),
            })?;
        function(self, args)
    }

    /// Names of registered query functions
    pub fn function_names(&self) -> Vec<&str> {
        self.extensions.function_names()
    }

    // ---- helpers ----

    fn index_of(&self, path: &str) -> Option<usize> {
        self.session.note_set().index_of(path)
    }

    fn note_at(&self, idx: usize) -> Option<&Note> {
        self.session.note_set().get(idx)
    }

    fn recent_indices(&self, k: usize) -> Vec<usize> {
        let notes = self.notes();
        let mut order: Vec<usize> = (0..notes.len()).collect();
        order.sort_by(|&a, &b| notes[b].modified.cmp(&notes[a].modified).then(a.cmp(&b)));
        order.truncate(k);
        order
    }
}
