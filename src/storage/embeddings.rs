//! Persistent embedding cache keyed by note path
//!
//! Only the semantic sub-vector is stored. Vectors are raw little-endian `f32`
//! bytes so reads never go through a parser.

use crate::error::{GeistError, Result};
use crate::storage::Database;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use std::collections::HashMap;
use std::sync::Arc;

/// A cached semantic sub-vector
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    pub note_path: String,
    pub vector: Vec<f32>,
    /// Model identity and/or content hash, see `EmbeddingComputer::version_tag`
    pub version_tag: String,
    pub content_hash: String,
    pub model: String,
    pub computed_at: DateTime<Utc>,
}

/// Embedding cache backed by the `embeddings` table
#[derive(Clone)]
pub struct EmbeddingStore {
    db: Arc<Database>,
}

impl EmbeddingStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Fetch a single record
    pub fn get(&self, note_path: &str) -> Result<Option<EmbeddingRecord>> {
        let conn = self.db.get_conn()?;
        let row = conn
            .query_row(
                "SELECT note_path, vector, version_tag, content_hash, model, computed_at
                 FROM embeddings WHERE note_path = ?1",
                [note_path],
                row_to_parts,
            )
            .optional()?;

        Ok(row.and_then(parts_to_record))
    }

    /// Fetch records for many notes; absent or undecodable rows are skipped
    pub fn get_many(&self, note_paths: &[&str]) -> Result<HashMap<String, EmbeddingRecord>> {
        let conn = self.db.get_conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT note_path, vector, version_tag, content_hash, model, computed_at
             FROM embeddings WHERE note_path = ?1",
        )?;

        let mut records = HashMap::with_capacity(note_paths.len());
        for path in note_paths {
            let parts = match stmt.query_row([path], row_to_parts).optional() {
                Ok(parts) => parts,
                Err(e) => {
                    tracing::warn!("Skipping unreadable cached embedding for {}: {}", path, e);
                    continue;
                }
            };
            if let Some(record) = parts.and_then(parts_to_record) {
                records.insert(record.note_path.clone(), record);
            }
        }

        Ok(records)
    }

    /// Upsert records in a single transaction
    ///
    /// Either every record is written or none is.
    pub fn put_many(&self, records: &[EmbeddingRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut conn = self.db.get_conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO embeddings
                 (note_path, vector, version_tag, content_hash, model, computed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for record in records {
                stmt.execute(params![
                    record.note_path,
                    encode_vector(&record.vector),
                    record.version_tag,
                    record.content_hash,
                    record.model,
                    record.computed_at.timestamp(),
                ])?;
            }
        }
        tx.commit()?;

        tracing::debug!("Persisted {} embeddings", records.len());
        Ok(records.len())
    }

    /// Drop cached vectors for notes no longer in the working set
    pub fn remove_missing(&self, keep_paths: &[&str]) -> Result<usize> {
        let mut conn = self.db.get_conn()?;
        let tx = conn.transaction()?;

        let stored: Vec<String> = {
            let mut stmt = tx.prepare("SELECT note_path FROM embeddings")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            rows.collect::<rusqlite::Result<Vec<String>>>()?
        };

        let keep: std::collections::HashSet<&str> = keep_paths.iter().copied().collect();
        let mut removed = 0;
        for path in stored.iter().filter(|p| !keep.contains(p.as_str())) {
            removed += tx.execute("DELETE FROM embeddings WHERE note_path = ?1", [path])?;
        }
        tx.commit()?;

        Ok(removed)
    }

    /// Number of cached vectors
    pub fn count(&self) -> Result<usize> {
        let conn = self.db.get_conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

type RowParts = (String, Vec<u8>, String, String, String, i64);

fn row_to_parts(row: &rusqlite::Row<'_>) -> rusqlite::Result<RowParts> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn parts_to_record(parts: RowParts) -> Option<EmbeddingRecord> {
    let (note_path, bytes, version_tag, content_hash, model, computed_at) = parts;
    let vector = match decode_vector(&bytes) {
        Ok(vector) => vector,
        Err(e) => {
            tracing::warn!("Ignoring cached embedding for {}: {}", note_path, e);
            return None;
        }
    };

    Some(EmbeddingRecord {
        note_path,
        vector,
        version_tag,
        content_hash,
        model,
        computed_at: DateTime::from_timestamp(computed_at, 0).unwrap_or_default(),
    })
}

/// Serialize a vector as little-endian `f32` bytes
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Deserialize little-endian `f32` bytes
pub fn decode_vector(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(GeistError::Store(format!(
            "Vector blob length {} is not a multiple of 4",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_store() -> (EmbeddingStore, TempDir) {
        let temp = TempDir::new().unwrap();
        let db = Arc::new(Database::new(&temp.path().join("test.db")).unwrap());
        (EmbeddingStore::new(db), temp)
    }

    fn record(path: &str, vector: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            note_path: path.to_string(),
            vector,
            version_tag: format!("test-model:{}", path),
            content_hash: path.to_string(),
            model: "test-model".to_string(),
            computed_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn test_put_and_get() {
        let (store, _temp) = create_store();
        let rec = record("a.md", vec![0.25, -1.5, 3.0]);

        assert_eq!(store.put_many(&[rec.clone()]).unwrap(), 1);
        assert_eq!(store.get("a.md").unwrap(), Some(rec));
        assert_eq!(store.get("missing.md").unwrap(), None);
    }

    #[test]
    fn test_put_overwrites() {
        let (store, _temp) = create_store();
        store.put_many(&[record("a.md", vec![1.0])]).unwrap();
        store.put_many(&[record("a.md", vec![2.0])]).unwrap();

        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.get("a.md").unwrap().unwrap().vector, vec![2.0]);
    }

    #[test]
    fn test_get_many_skips_absent() {
        let (store, _temp) = create_store();
        store
            .put_many(&[record("a.md", vec![1.0]), record("b.md", vec![2.0])])
            .unwrap();

        let found = store.get_many(&["a.md", "c.md"]).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found.contains_key("a.md"));
    }

    #[test]
    fn test_get_many_skips_corrupt_rows() {
        let (store, _temp) = create_store();
        store
            .put_many(&[
                record("a.md", vec![1.0]),
                record("b.md", vec![2.0]),
                record("c.md", vec![3.0]),
            ])
            .unwrap();

        let conn = store.db.get_conn().unwrap();
        // Wrong column type fails the row read itself
        conn.execute("UPDATE embeddings SET vector = 42 WHERE note_path = 'a.md'", [])
            .unwrap();
        // Truncated blob fails vector decoding
        conn.execute(
            "UPDATE embeddings SET vector = X'0000803F00' WHERE note_path = 'c.md'",
            [],
        )
        .unwrap();
        drop(conn);

        let found = store.get_many(&["a.md", "b.md", "c.md"]).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found["b.md"].vector, vec![2.0]);
    }

    #[test]
    fn test_remove_missing() {
        let (store, _temp) = create_store();
        store
            .put_many(&[
                record("a.md", vec![1.0]),
                record("b.md", vec![2.0]),
                record("c.md", vec![3.0]),
            ])
            .unwrap();

        assert_eq!(store.remove_missing(&["b.md"]).unwrap(), 2);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_vector_bytes_are_exact() {
        let vector = vec![0.1f32, f32::MIN_POSITIVE, -0.0, 42.0];
        let decoded = decode_vector(&encode_vector(&vector)).unwrap();
        assert_eq!(
            decoded.iter().map(|v| v.to_bits()).collect::<Vec<_>>(),
            vector.iter().map(|v| v.to_bits()).collect::<Vec<_>>()
        );
        assert!(decode_vector(&[0u8; 5]).is_err());
    }
}
