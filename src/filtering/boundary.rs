// Boundary stage: structural checks against the resolved note set
use crate::filtering::types::Suggestion;
use crate::filtering::utils;
use crate::query::QueryEngine;

/// Rejects suggestions that reference unknown or excluded notes
pub struct BoundaryFilter {
    excluded_paths: Vec<String>,
}

impl BoundaryFilter {
    pub fn new(excluded_paths: Vec<String>) -> Self {
        Self { excluded_paths }
    }

    /// Whether every referenced note exists and none is excluded
    pub fn accepts(&self, suggestion: &Suggestion, engine: &QueryEngine) -> bool {
        suggestion.notes.iter().all(|path| {
            if !engine.contains(path) {
                tracing::debug!(
                    "Boundary: {} references unknown note {}",
                    suggestion.geist_id,
                    path
                );
                return false;
            }
            if utils::is_excluded(path, &self.excluded_paths) {
                tracing::debug!(
                    "Boundary: {} references excluded note {}",
                    suggestion.geist_id,
                    path
                );
                return false;
            }
            true
        })
    }

    pub fn filter(&self, suggestions: Vec<Suggestion>, engine: &QueryEngine) -> Vec<Suggestion> {
        suggestions
            .into_iter()
            .filter(|s| self.accepts(s, engine))
            .collect()
    }
}
