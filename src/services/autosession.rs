// SPDX-License-Identifier: MIT

//! Auto-Session Creator: turns unmatched cached workouts into draft
//! sessions awaiting review.
//!
//! Local date and time are derived from the workout's recorded timezone
//! offset at write time. `backfill_session_timezones` remains as a repair
//! pass for sessions created before write-time conversion existed.

use crate::db::Db;
use crate::error::{AppError, Result};
use crate::models::{CachedWorkout, NewSession};
use crate::services::matching::{metrics_from, overlap_percentage, session_interval, MIN_OVERLAP_PCT};
use crate::time_utils::to_local_naive;

/// Gym name used when the profile carries no default.
const FALLBACK_GYM_NAME: &str = "Imported";

/// Class type used when neither the workout nor the profile names one.
const FALLBACK_CLASS_TYPE: &str = "Workout";

/// Creates draft sessions from unmatched imports.
#[derive(Clone)]
pub struct AutoSessionService {
    db: Db,
}

impl AutoSessionService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Create a draft session for every unlinked cached workout.
    ///
    /// Returns `None` when the connection has auto-creation disabled,
    /// otherwise the number of sessions created. One bad workout never
    /// blocks the rest: its failure is logged and skipped.
    pub async fn auto_create_sessions_for_workouts(&self, user_id: i64) -> Result<Option<u32>> {
        let connection = self
            .db
            .get_connection(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("WHOOP connection for user {}", user_id)))?;
        if !connection.auto_create_sessions {
            return Ok(None);
        }

        let profile = self.db.get_profile(user_id).await?;
        let default_gym = profile
            .as_ref()
            .and_then(|p| p.default_gym.clone())
            .unwrap_or_else(|| FALLBACK_GYM_NAME.to_string());
        let default_class_type = profile
            .as_ref()
            .and_then(|p| p.default_class_type.clone())
            .unwrap_or_else(|| FALLBACK_CLASS_TYPE.to_string());

        let mut created = 0u32;
        for workout in self.db.unlinked_workouts(user_id).await? {
            // A workout overlapping an already-logged session belongs to
            // the matching flow, not a duplicate draft
            match self.overlaps_existing_session(user_id, &workout).await {
                Ok(true) => {
                    tracing::debug!(
                        user_id,
                        whoop_workout_id = %workout.whoop_workout_id,
                        "Workout overlaps a logged session, leaving for matching"
                    );
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(error = %e, user_id, "Overlap check failed, skipping workout");
                    continue;
                }
            }

            match self
                .create_session_for_workout(user_id, &workout, &default_gym, &default_class_type)
                .await
            {
                Ok(()) => created += 1,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        user_id,
                        whoop_workout_id = %workout.whoop_workout_id,
                        "Failed to auto-create session, skipping workout"
                    );
                }
            }
        }

        if created > 0 {
            tracing::info!(user_id, created, "Auto-created sessions from workouts");
        }
        Ok(Some(created))
    }

    /// True when a logged session on the workout's local date overlaps it
    /// past the matching threshold, compared in the local wall-clock frame.
    async fn overlaps_existing_session(
        &self,
        user_id: i64,
        workout: &CachedWorkout,
    ) -> Result<bool> {
        let local_start = to_local_naive(workout.start_time, &workout.timezone_offset);
        let local_end = to_local_naive(workout.end_time, &workout.timezone_offset);

        let sessions = self
            .db
            .sessions_in_date_range(user_id, local_start.date(), local_end.date())
            .await?;

        Ok(sessions.iter().any(|session| {
            let (session_start, session_end) = session_interval(session);
            overlap_percentage(
                session_start,
                session_end,
                local_start.and_utc(),
                local_end.and_utc(),
            ) >= MIN_OVERLAP_PCT
        }))
    }

    async fn create_session_for_workout(
        &self,
        user_id: i64,
        workout: &CachedWorkout,
        default_gym: &str,
        default_class_type: &str,
    ) -> Result<()> {
        let local_start = to_local_naive(workout.start_time, &workout.timezone_offset);
        let duration_minutes = (workout.duration_seconds() / 60).max(1);

        let session = NewSession {
            user_id,
            date: local_start.date(),
            class_time: local_start.time(),
            duration_minutes,
            gym_name: default_gym.to_string(),
            class_type: workout
                .sport_name
                .clone()
                .unwrap_or_else(|| default_class_type.to_string()),
            source: "whoop".to_string(),
            needs_review: true,
            metrics: Some(metrics_from(workout)),
        };

        let session_id = self.db.create_session(&session).await?;
        self.db
            .link_workout_to_session(workout.id, session_id)
            .await?;
        Ok(())
    }

    /// Re-derive local date/time for auto-created sessions whose stored
    /// values disagree with the linked workout's timezone offset, and fix
    /// them. Returns the number of sessions corrected.
    pub async fn backfill_session_timezones(&self, user_id: i64) -> Result<u32> {
        let mut fixed = 0u32;

        for workout in self.db.workouts_linked_to_auto_sessions(user_id).await? {
            let Some(session_id) = workout.session_id else {
                continue;
            };
            let Some(session) = self.db.get_session(user_id, session_id).await? else {
                continue;
            };

            let expected = to_local_naive(workout.start_time, &workout.timezone_offset);
            if session.date == expected.date() && session.class_time == expected.time() {
                continue;
            }

            self.db
                .update_session_local_time(session_id, expected.date(), expected.time())
                .await?;
            fixed += 1;
            tracing::info!(
                user_id,
                session_id,
                date = %expected.date(),
                "Corrected auto-created session local time"
            );
        }

        Ok(fixed)
    }
}
