//! Per-session temporal features
//!
//! Age is measured against the session date, never wall-clock now, so these
//! are recomputed every session even when the semantic vector is cached.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use std::f32::consts::PI;

/// Length of the temporal sub-vector
pub const TEMPORAL_DIM: usize = 3;

/// `[normalized_age, sin(season), cos(season)]` for a note created at `created`
pub fn temporal_features(
    created: DateTime<Utc>,
    session_date: NaiveDate,
    max_age_days: u32,
) -> [f32; TEMPORAL_DIM] {
    let max_age = max_age_days.max(1) as f32;
    let age_days = (session_date - created.date_naive()).num_days() as f32;
    let age = age_days.clamp(0.0, max_age) / max_age;

    let phase = 2.0 * PI * created.ordinal() as f32 / 365.0;

    [age, phase.sin(), phase.cos()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_age_normalization() {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let [age, _, _] = temporal_features(created, date(2024, 1, 11), 100);
        assert!((age - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_age_clamps() {
        let created = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        let [old, _, _] = temporal_features(created, date(2024, 1, 1), 365);
        assert_eq!(old, 1.0);

        let future = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let [young, _, _] = temporal_features(future, date(2024, 1, 1), 365);
        assert_eq!(young, 0.0);
    }

    #[test]
    fn test_seasonal_phase_on_unit_circle() {
        let created = Utc.with_ymd_and_hms(2023, 7, 2, 0, 0, 0).unwrap();
        let [_, s, c] = temporal_features(created, date(2024, 1, 1), 365);
        assert!(((s * s + c * c) - 1.0).abs() < 1e-5);
        // Early July sits roughly half way round the year
        assert!(c < -0.9);
    }

    #[test]
    fn test_session_date_changes_age_only() {
        let created = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let a = temporal_features(created, date(2024, 3, 1), 3650);
        let b = temporal_features(created, date(2024, 3, 2), 3650);
        assert_ne!(a[0], b[0]);
        assert_eq!(a[1], b[1]);
        assert_eq!(a[2], b[2]);
    }
}
