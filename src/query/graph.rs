//! Resolved link graph over a session's notes
//!
//! Built once per session from the notes' outbound links. Every per-note
//! answer is an indexed lookup; nothing scans note pairs.

use crate::notes::NoteSet;
use ahash::{HashSet, HashSetExt};
use serde::{Deserialize, Serialize};

/// Adjacency lists keyed by note index in canonical order
#[derive(Debug, Clone, Default)]
pub struct LinkGraph {
    outgoing: Vec<Vec<usize>>,
    incoming: Vec<Vec<usize>>,
    /// Unordered linked pairs as `(min, max)`
    linked_pairs: HashSet<(usize, usize)>,
    /// `(source index, raw target)` for links that resolve to nothing
    dangling: Vec<(usize, String)>,
}

impl LinkGraph {
    /// Resolve every link once; O(links)
    pub fn build(notes: &NoteSet) -> Self {
        let n = notes.len();
        let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut incoming: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut linked_pairs = HashSet::new();
        let mut dangling = Vec::new();

        for (source, note) in notes.notes().iter().enumerate() {
            for link in &note.links {
                match notes.resolve(&link.target) {
                    Some(target) if target == source => {}
                    Some(target) => {
                        outgoing[source].push(target);
                        incoming[target].push(source);
                        linked_pairs.insert(ordered(source, target));
                    }
                    None => dangling.push((source, link.target.clone())),
                }
            }
        }

        for list in outgoing.iter_mut().chain(incoming.iter_mut()) {
            list.sort_unstable();
            list.dedup();
        }

        tracing::debug!(
            "Link graph built: {} edges, {} dangling links",
            linked_pairs.len(),
            dangling.len()
        );

        Self {
            outgoing,
            incoming,
            linked_pairs,
            dangling,
        }
    }

    /// Notes linked from `index`
    pub fn outgoing(&self, index: usize) -> &[usize] {
        self.outgoing.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Notes linking to `index`
    pub fn incoming(&self, index: usize) -> &[usize] {
        self.incoming.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Notes linked in either direction, ascending
    pub fn neighbors(&self, index: usize) -> Vec<usize> {
        let mut all: Vec<usize> = self
            .outgoing(index)
            .iter()
            .chain(self.incoming(index))
            .copied()
            .collect();
        all.sort_unstable();
        all.dedup();
        all
    }

    /// Whether a resolved link exists between `a` and `b` in either direction
    pub fn has_link(&self, a: usize, b: usize) -> bool {
        self.linked_pairs.contains(&ordered(a, b))
    }

    /// Top `k` notes by resolved in-degree; ties by canonical order
    pub fn hubs(&self, k: usize) -> Vec<(usize, usize)> {
        let mut ranked: Vec<(usize, usize)> = self
            .incoming
            .iter()
            .enumerate()
            .filter(|(_, sources)| !sources.is_empty())
            .map(|(idx, sources)| (idx, sources.len()))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(k);
        ranked
    }

    /// Notes with no resolved edge in either direction
    pub fn orphans(&self) -> Vec<usize> {
        (0..self.outgoing.len())
            .filter(|&idx| self.outgoing[idx].is_empty() && self.incoming[idx].is_empty())
            .collect()
    }

    pub fn linked_pairs(&self) -> &HashSet<(usize, usize)> {
        &self.linked_pairs
    }

    pub fn dangling(&self) -> &[(usize, String)] {
        &self.dangling
    }

    pub fn stats(&self) -> GraphStats {
        GraphStats {
            note_count: self.outgoing.len(),
            edge_count: self.outgoing.iter().map(Vec::len).sum(),
            linked_pair_count: self.linked_pairs.len(),
            orphan_count: self.orphans().len(),
            dangling_count: self.dangling.len(),
        }
    }
}

fn ordered(a: usize, b: usize) -> (usize, usize) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Link graph statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub note_count: usize,
    /// Directed resolved edges, duplicates collapsed
    pub edge_count: usize,
    pub linked_pair_count: usize,
    pub orphan_count: usize,
    pub dangling_count: usize,
}
