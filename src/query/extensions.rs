// Extension points for the plugin layer
// Inferrers add per-note metadata; query functions are named handlers invoked
// through `QueryEngine::call`. Both receive the engine by shared reference.
use super::QueryEngine;
use crate::error::Result;
use crate::notes::Note;
use std::collections::BTreeMap;

/// Note metadata keyed by name
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Named handler callable with JSON arguments
pub type QueryFunction =
    Box<dyn Fn(&QueryEngine, &[serde_json::Value]) -> Result<serde_json::Value> + Send + Sync>;

/// Given a note and the query engine, derive extra metadata keys
pub trait MetadataInferrer: Send + Sync {
    fn name(&self) -> &str;

    fn infer(&self, note: &Note, engine: &QueryEngine) -> Result<Metadata>;
}

/// Registered inferrers and query functions
#[derive(Default)]
pub struct ExtensionRegistry {
    inferrers: Vec<Box<dyn MetadataInferrer>>,
    functions: BTreeMap<String, QueryFunction>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an inferrer; inferrers run in registration order
    pub fn register_inferrer(&mut self, inferrer: Box<dyn MetadataInferrer>) {
        tracing::debug!("Registered metadata inferrer {}", inferrer.name());
        self.inferrers.push(inferrer);
    }

    /// Add a query function, replacing any previous one with the same name
    pub fn register_function<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(&QueryEngine, &[serde_json::Value]) -> Result<serde_json::Value>
            + Send
            + Sync
            + 'static,
    {
        let name = name.into();
        if self.functions.insert(name.clone(), Box::new(function)).is_some() {
            tracing::warn!("Query function {} replaced", name);
        }
    }

    pub fn inferrers(&self) -> &[Box<dyn MetadataInferrer>] {
        &self.inferrers
    }

    pub fn function(&self, name: &str) -> Option<&QueryFunction> {
        self.functions.get(name)
    }

    pub fn function_names(&self) -> Vec<&str> {
        self.functions.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::engine_for;
    use super::*;
    use crate::error::GeistError;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    struct ShoutInferrer;

    impl MetadataInferrer for ShoutInferrer {
        fn name(&self) -> &str {
            "shout"
        }

        fn infer(&self, note: &Note, engine: &QueryEngine) -> Result<Metadata> {
            let mut meta = Metadata::new();
            meta.insert("upper_title".into(), json!(note.title.to_uppercase()));
            // Re-entrant semantic query must not disturb the engine's caches
            meta.insert(
                "neighbour_count".into(),
                json!(engine.neighbours(&note.path, 5).len()),
            );
            meta.insert("word_count".into(), json!(-1));
            Ok(meta)
        }
    }

    struct FailingInferrer;

    impl MetadataInferrer for FailingInferrer {
        fn name(&self) -> &str {
            "failing"
        }

        fn infer(&self, _note: &Note, _engine: &QueryEngine) -> Result<Metadata> {
            Err(GeistError::Extension {
                name: "failing".into(),
                message: "boom".into(),
            })
        }
    }

    fn notes() -> Vec<Note> {
        let created = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        vec![
            Note::new("a.md", "alpha", "first note body", created).with_link("b"),
            Note::new("b.md", "beta", "second note body", created),
        ]
    }

    #[test]
    fn test_inferrers_merge_without_overriding_builtins() {
        let mut registry = ExtensionRegistry::new();
        registry.register_inferrer(Box::new(FailingInferrer));
        registry.register_inferrer(Box::new(ShoutInferrer));
        let engine = engine_for(notes()).with_extensions(registry);

        let before = engine.similarity("a.md", "b.md");
        let meta = engine.metadata("a.md");

        assert_eq!(meta["upper_title"], json!("ALPHA"));
        assert_eq!(meta["neighbour_count"], json!(1));
        assert_eq!(meta["word_count"], json!(3));
        assert_eq!(meta["link_count"], json!(1));
        assert_eq!(engine.similarity("a.md", "b.md"), before);
    }

    #[test]
    fn test_call_registered_function() {
        let mut registry = ExtensionRegistry::new();
        registry.register_function("hub_paths", |engine: &QueryEngine, args: &[serde_json::Value]| {
            let k = args.first().and_then(|v| v.as_u64()).unwrap_or(1) as usize;
            let paths: Vec<String> = engine.hubs(k).iter().map(|n| n.path.clone()).collect();
            Ok(json!(paths))
        });
        let engine = engine_for(notes()).with_extensions(registry);

        assert_eq!(engine.call("hub_paths", &[json!(3)]).unwrap(), json!(["b.md"]));
        assert_eq!(engine.function_names(), vec!["hub_paths"]);
        assert!(matches!(
            engine.call("missing", &[]),
            Err(GeistError::Extension { .. })
        ));
    }
}
