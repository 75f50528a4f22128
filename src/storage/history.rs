//! Suggestion history for the novelty filter's lookback window

use crate::error::Result;
use crate::storage::Database;
use chrono::{Duration, NaiveDate};
use rusqlite::params;
use std::sync::Arc;

/// A suggestion emitted by a past session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub session_date: NaiveDate,
    pub geist_id: String,
    pub text: String,
}

/// Emitted-suggestion log backed by the `suggestion_history` table
#[derive(Clone)]
pub struct SuggestionHistory {
    db: Arc<Database>,
}

impl SuggestionHistory {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Record the suggestions emitted for `session_date`
    ///
    /// Entries previously recorded for the same date are replaced, so
    /// re-running a date leaves the history unchanged.
    pub fn record(&self, session_date: NaiveDate, entries: &[(String, String)]) -> Result<usize> {
        let date = session_date.format("%Y-%m-%d").to_string();
        let mut conn = self.db.get_conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM suggestion_history WHERE session_date = ?1",
            [&date],
        )?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO suggestion_history (session_date, geist_id, text, created_at)
                 VALUES (?1, ?2, ?3, strftime('%s', 'now'))",
            )?;
            for (geist_id, text) in entries {
                stmt.execute(params![date, geist_id, text])?;
            }
        }
        tx.commit()?;

        Ok(entries.len())
    }

    /// Entries from the `lookback_days` days before `session_date`
    ///
    /// The window is `[session_date - lookback_days, session_date)`; the
    /// session's own date is excluded so re-runs are reproducible.
    pub fn entries_in_window(
        &self,
        session_date: NaiveDate,
        lookback_days: u32,
    ) -> Result<Vec<HistoryEntry>> {
        let cutoff = session_date - Duration::days(i64::from(lookback_days));
        let conn = self.db.get_conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT session_date, geist_id, text FROM suggestion_history
             WHERE session_date >= ?1 AND session_date < ?2
             ORDER BY session_date, id",
        )?;

        let rows = stmt.query_map(
            params![
                cutoff.format("%Y-%m-%d").to_string(),
                session_date.format("%Y-%m-%d").to_string()
            ],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )?;

        let mut entries = Vec::new();
        for row in rows {
            let (date, geist_id, text) = row?;
            match NaiveDate::parse_from_str(&date, "%Y-%m-%d") {
                Ok(session_date) => entries.push(HistoryEntry {
                    session_date,
                    geist_id,
                    text,
                }),
                Err(e) => tracing::warn!("Skipping history row with bad date {}: {}", date, e),
            }
        }

        Ok(entries)
    }

    /// Texts emitted within the lookback window
    pub fn texts_in_window(&self, session_date: NaiveDate, lookback_days: u32) -> Result<Vec<String>> {
        Ok(self
            .entries_in_window(session_date, lookback_days)?
            .into_iter()
            .map(|entry| entry.text)
            .collect())
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.db.get_conn()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM suggestion_history", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
