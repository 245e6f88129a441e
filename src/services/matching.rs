// SPDX-License-Identifier: MIT

//! Matching Engine: deterministic overlap scoring between cached WHOOP
//! workouts and logged training sessions.
//!
//! The score is the share of the shorter interval's duration that the two
//! intervals spend overlapping in wall-clock time. Candidates under the
//! threshold are dropped; the rest come back sorted best-first.

use crate::db::Db;
use crate::error::{AppError, Result};
use crate::models::{CachedWorkout, Session, WearableMetrics};
use crate::services::sync::SyncEngine;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Candidates below this overlap percentage are not proposed.
pub const MIN_OVERLAP_PCT: f64 = 30.0;

/// The search window extends this far beyond the session on both sides.
const SEARCH_WINDOW_PAD_HOURS: i64 = 2;

/// Window for the on-demand sync when the cache has no candidates.
const ON_DEMAND_SYNC_DAYS: i64 = 3;

/// Denominator fallback when either interval has a non-positive duration.
const FALLBACK_DURATION_SECS: i64 = 3600;

/// A candidate workout annotated with its overlap score.
#[derive(Debug, Clone, Serialize)]
pub struct WorkoutMatch {
    pub workout: CachedWorkout,
    pub overlap_pct: f64,
}

/// Proposes and applies workout → session links.
#[derive(Clone)]
pub struct MatchingService {
    db: Db,
    sync: SyncEngine,
}

impl MatchingService {
    pub fn new(db: Db, sync: SyncEngine) -> Self {
        Self { db, sync }
    }

    /// Score cached workouts against a session and return candidates with
    /// at least [`MIN_OVERLAP_PCT`] overlap, best first.
    pub async fn find_matches(
        &self,
        user_id: i64,
        session_id: i64,
    ) -> Result<Vec<WorkoutMatch>> {
        let session = self
            .db
            .get_session(user_id, session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Session {}", session_id)))?;

        let (session_start, session_end) = session_interval(&session);

        let window_start = session_start - Duration::hours(SEARCH_WINDOW_PAD_HOURS);
        let window_end = session_end + Duration::hours(SEARCH_WINDOW_PAD_HOURS);

        let mut candidates = self
            .db
            .workouts_in_window(user_id, window_start, window_end)
            .await?;

        if candidates.is_empty() {
            // Cache miss: pull recent workouts once, then retry.
            if let Err(e) = self.sync.sync_workouts(user_id, ON_DEMAND_SYNC_DAYS).await {
                tracing::warn!(error = %e, user_id, "On-demand sync for matching failed");
            }
            candidates = self
                .db
                .workouts_in_window(user_id, window_start, window_end)
                .await?;
        }

        let mut matches: Vec<WorkoutMatch> = candidates
            .into_iter()
            .map(|workout| {
                let overlap_pct = overlap_percentage(
                    session_start,
                    session_end,
                    workout.start_time,
                    workout.end_time,
                );
                WorkoutMatch {
                    workout,
                    overlap_pct,
                }
            })
            .filter(|m| m.overlap_pct >= MIN_OVERLAP_PCT)
            .collect();

        matches.sort_by(|a, b| {
            b.overlap_pct
                .partial_cmp(&a.overlap_pct)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        tracing::debug!(
            user_id,
            session_id,
            candidates = matches.len(),
            "Match search complete"
        );
        Ok(matches)
    }

    /// Copy a cached workout's biometrics onto a session and record the
    /// link. Both sides must exist and be unlinked.
    pub async fn apply_workout_to_session(
        &self,
        user_id: i64,
        session_id: i64,
        workout_cache_id: i64,
    ) -> Result<()> {
        self.db
            .get_session(user_id, session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Session {}", session_id)))?;

        let workout = self
            .db
            .get_cached_workout(user_id, workout_cache_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Workout not found in cache".to_string()))?;

        // One-to-one link invariant, enforced here at the application layer.
        if let Some(linked) = workout.session_id {
            if linked != session_id {
                return Err(AppError::BadRequest(format!(
                    "Workout already linked to session {}",
                    linked
                )));
            }
        }
        if let Some(other) = self.db.workout_linked_to_session(user_id, session_id).await? {
            if other.id != workout_cache_id {
                return Err(AppError::BadRequest(format!(
                    "Session already linked to workout {}",
                    other.id
                )));
            }
        }

        self.db
            .update_session_wearable_metrics(session_id, &metrics_from(&workout))
            .await?;
        self.db
            .link_workout_to_session(workout_cache_id, session_id)
            .await?;

        tracing::info!(
            user_id,
            session_id,
            workout_cache_id,
            "Workout applied to session"
        );
        Ok(())
    }
}

/// Biometrics copied onto a session when a workout links to it.
pub fn metrics_from(workout: &CachedWorkout) -> WearableMetrics {
    WearableMetrics {
        strain: workout.strain,
        calories: workout.calories,
        average_heart_rate: workout.average_heart_rate,
        max_heart_rate: workout.max_heart_rate,
    }
}

/// Share of the shorter interval spent overlapping, as a percentage.
///
/// Never negative and never panics: a non-positive duration on either
/// side switches the denominator to a one-hour fallback.
pub fn overlap_percentage(
    session_start: DateTime<Utc>,
    session_end: DateTime<Utc>,
    workout_start: DateTime<Utc>,
    workout_end: DateTime<Utc>,
) -> f64 {
    let overlap_seconds = (session_end.min(workout_end) - session_start.max(workout_start))
        .num_seconds()
        .max(0);

    let session_duration = (session_end - session_start).num_seconds();
    let workout_duration = (workout_end - workout_start).num_seconds();

    let min_duration = if session_duration <= 0 || workout_duration <= 0 {
        FALLBACK_DURATION_SECS
    } else {
        session_duration.min(workout_duration)
    };

    overlap_seconds as f64 / min_duration as f64 * 100.0
}

/// Session start/end in the journal's wall-clock frame.
pub fn session_interval(session: &Session) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = session.date.and_time(session.class_time).and_utc();
    (start, start + Duration::minutes(session.duration_minutes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, h, m, 0).unwrap()
    }

    #[test]
    fn test_partial_overlap() {
        // Session 09:00-10:00 vs workout 09:15-10:15: 45 of 60 minutes
        let pct = overlap_percentage(at(9, 0), at(10, 0), at(9, 15), at(10, 15));
        assert!((pct - 75.0).abs() < f64::EPSILON);
        assert!(pct >= MIN_OVERLAP_PCT);
    }

    #[test]
    fn test_disjoint_intervals() {
        // Same day, hours apart
        let pct = overlap_percentage(at(9, 0), at(10, 0), at(14, 0), at(15, 0));
        assert_eq!(pct, 0.0);
        assert!(pct < MIN_OVERLAP_PCT);
    }

    #[test]
    fn test_exact_containment() {
        let pct = overlap_percentage(at(9, 0), at(10, 0), at(9, 0), at(10, 0));
        assert!((pct - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_short_interval_inside_longer_one() {
        // 30-minute workout fully inside a 60-minute session: 100% of the
        // shorter interval
        let pct = overlap_percentage(at(9, 0), at(10, 0), at(9, 15), at(9, 45));
        assert!((pct - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_never_negative() {
        let pct = overlap_percentage(at(9, 0), at(10, 0), at(20, 0), at(21, 0));
        assert!(pct >= 0.0);
    }

    #[test]
    fn test_zero_length_session_uses_fallback_denominator() {
        // Zero-length session at 09:30 inside the workout: overlap is 0
        // seconds, denominator falls back to 3600 instead of dividing by 0
        let pct = overlap_percentage(at(9, 30), at(9, 30), at(9, 0), at(10, 0));
        assert_eq!(pct, 0.0);
    }

    #[test]
    fn test_zero_length_both_sides() {
        let pct = overlap_percentage(at(9, 30), at(9, 30), at(9, 30), at(9, 30));
        assert_eq!(pct, 0.0);
    }

    #[test]
    fn test_adjacent_intervals_do_not_overlap() {
        let pct = overlap_percentage(at(9, 0), at(10, 0), at(10, 0), at(11, 0));
        assert_eq!(pct, 0.0);
    }
}
