//! Note records supplied by the ingestion layer
//!
//! Notes are read-only to the core. `NoteSet` fixes the canonical ordering for a
//! session and resolves textual link targets lazily against it.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// A single outbound link from a note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub source_path: String,
    /// Unresolved textual reference, e.g. `"Other Note"` or `"dir/other.md#Heading"`
    pub target: String,
    #[serde(default)]
    pub display_text: Option<String>,
    #[serde(default)]
    pub is_embed: bool,
    #[serde(default)]
    pub block_ref: Option<String>,
}

impl Link {
    pub fn new(source_path: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            target: target.into(),
            display_text: None,
            is_embed: false,
            block_ref: None,
        }
    }
}

/// A unit of text content with identity, links and tags
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    /// Stable unique identifier for the session
    pub path: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,

    // Virtual entry fields; carried through untouched
    #[serde(default)]
    pub is_virtual: bool,
    #[serde(default)]
    pub source_file: Option<String>,
    #[serde(default)]
    pub entry_date: Option<NaiveDate>,
}

impl Note {
    /// Create a note with identical created/modified timestamps
    pub fn new(
        path: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        created: DateTime<Utc>,
    ) -> Self {
        Self {
            path: path.into(),
            title: title.into(),
            content: content.into(),
            links: Vec::new(),
            tags: BTreeSet::new(),
            created,
            modified: created,
            is_virtual: false,
            source_file: None,
            entry_date: None,
        }
    }

    /// Add an outbound link to `target`
    pub fn with_link(mut self, target: impl Into<String>) -> Self {
        let link = Link::new(self.path.clone(), target);
        self.links.push(link);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_modified(mut self, modified: DateTime<Utc>) -> Self {
        self.modified = modified;
        self
    }

    /// Text handed to the embedding model: title and body, whitespace collapsed
    ///
    /// Empty when the body is blank, whatever the title; such notes get a
    /// zero semantic vector.
    pub fn embeddable_text(&self) -> String {
        let body = normalize_whitespace(&self.content);
        if body.is_empty() {
            return String::new();
        }

        let title = normalize_whitespace(&self.title);
        if title.is_empty() {
            body
        } else {
            format!("{}\n\n{}", title, body)
        }
    }

    /// Number of whitespace separated words in the body
    pub fn word_count(&self) -> usize {
        self.content.split_whitespace().count()
    }
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strip `|alias`, `#heading` and `#^block` suffixes from a link target
pub fn link_target_key(target: &str) -> &str {
    let target = target.split('|').next().unwrap_or(target);
    let target = target.split('#').next().unwrap_or(target);
    target.trim()
}

/// Ordered, deduplicated note collection with link-target lookup tables
#[derive(Debug, Clone, Default)]
pub struct NoteSet {
    notes: Vec<Note>,
    by_path: HashMap<String, usize>,
    by_stem: HashMap<String, usize>,
    by_title: HashMap<String, usize>,
}

impl NoteSet {
    /// Build the canonical ordering: sorted by path, first occurrence wins
    pub fn new(notes: Vec<Note>) -> Self {
        let mut seen = std::collections::HashSet::new();
        let mut unique: Vec<Note> = Vec::with_capacity(notes.len());
        for note in notes {
            if seen.insert(note.path.clone()) {
                unique.push(note);
            } else {
                tracing::debug!("Dropping duplicate note path: {}", note.path);
            }
        }
        unique.sort_by(|a, b| a.path.cmp(&b.path));

        let mut by_path = HashMap::with_capacity(unique.len());
        let mut by_stem = HashMap::new();
        let mut by_title = HashMap::new();

        for (idx, note) in unique.iter().enumerate() {
            by_path.insert(note.path.clone(), idx);
            if let Some(stem) = note.path.strip_suffix(".md") {
                by_stem.entry(stem.to_string()).or_insert(idx);
            }
            by_title.entry(note.title.to_lowercase()).or_insert(idx);
        }

        Self {
            notes: unique,
            by_path,
            by_stem,
            by_title,
        }
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Note> {
        self.notes.get(idx)
    }

    pub fn index_of(&self, path: &str) -> Option<usize> {
        self.by_path.get(path).copied()
    }

    pub fn by_path(&self, path: &str) -> Option<&Note> {
        self.index_of(path).map(|idx| &self.notes[idx])
    }

    /// Resolve a textual link target: exact path, path + ".md", then title
    ///
    /// Unresolvable targets yield `None` (dangling link).
    pub fn resolve(&self, target: &str) -> Option<usize> {
        let key = link_target_key(target);
        if key.is_empty() {
            return None;
        }

        if let Some(idx) = self.by_path.get(key) {
            return Some(*idx);
        }
        if let Some(idx) = self.by_path.get(&format!("{}.md", key)) {
            return Some(*idx);
        }
        if let Some(idx) = self.by_stem.get(key) {
            return Some(*idx);
        }
        self.by_title.get(&key.to_lowercase()).copied()
    }
}
