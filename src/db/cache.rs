//! Workout and recovery-cycle cache operations.
//!
//! Upserts key on (user, external id) so re-syncing an overlapping window
//! overwrites payload fields in place. The session link survives upserts.

use super::Db;
use crate::error::AppError;
use crate::models::{CachedRecoveryCycle, CachedWorkout, NewCachedRecoveryCycle, NewCachedWorkout};
use chrono::{DateTime, Utc};

impl Db {
    // ─── Workout Cache ───────────────────────────────────────────

    /// Insert or fully overwrite a cached workout.
    pub async fn upsert_workout(&self, workout: &NewCachedWorkout) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO cached_workouts
                (user_id, whoop_workout_id, start_time, end_time, timezone_offset,
                 sport_id, sport_name, strain, average_heart_rate, max_heart_rate,
                 kilojoules, calories, zone_durations_json, raw_json, synced_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id, whoop_workout_id) DO UPDATE SET
                start_time = excluded.start_time,
                end_time = excluded.end_time,
                timezone_offset = excluded.timezone_offset,
                sport_id = excluded.sport_id,
                sport_name = excluded.sport_name,
                strain = excluded.strain,
                average_heart_rate = excluded.average_heart_rate,
                max_heart_rate = excluded.max_heart_rate,
                kilojoules = excluded.kilojoules,
                calories = excluded.calories,
                zone_durations_json = excluded.zone_durations_json,
                raw_json = excluded.raw_json,
                synced_at = excluded.synced_at
            "#,
        )
        .bind(workout.user_id)
        .bind(&workout.whoop_workout_id)
        .bind(workout.start_time)
        .bind(workout.end_time)
        .bind(&workout.timezone_offset)
        .bind(workout.sport_id)
        .bind(&workout.sport_name)
        .bind(workout.strain)
        .bind(workout.average_heart_rate)
        .bind(workout.max_heart_rate)
        .bind(workout.kilojoules)
        .bind(workout.calories)
        .bind(&workout.zone_durations_json)
        .bind(&workout.raw_json)
        .bind(workout.synced_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Get one cached workout by its local row ID.
    pub async fn get_cached_workout(
        &self,
        user_id: i64,
        cache_id: i64,
    ) -> Result<Option<CachedWorkout>, AppError> {
        let row = sqlx::query_as::<_, CachedWorkout>(
            "SELECT * FROM cached_workouts WHERE user_id = ? AND id = ?",
        )
        .bind(user_id)
        .bind(cache_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    /// Cached workouts starting inside a window, oldest first.
    pub async fn workouts_in_window(
        &self,
        user_id: i64,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<CachedWorkout>, AppError> {
        let rows = sqlx::query_as::<_, CachedWorkout>(
            r#"
            SELECT * FROM cached_workouts
            WHERE user_id = ? AND start_time >= ? AND start_time <= ?
            ORDER BY start_time
            "#,
        )
        .bind(user_id)
        .bind(window_start)
        .bind(window_end)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    /// Cached workouts not yet linked to any session.
    pub async fn unlinked_workouts(&self, user_id: i64) -> Result<Vec<CachedWorkout>, AppError> {
        let rows = sqlx::query_as::<_, CachedWorkout>(
            r#"
            SELECT * FROM cached_workouts
            WHERE user_id = ? AND session_id IS NULL
            ORDER BY start_time
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    /// Cached workouts linked to auto-created sessions (timezone repair).
    pub async fn workouts_linked_to_auto_sessions(
        &self,
        user_id: i64,
    ) -> Result<Vec<CachedWorkout>, AppError> {
        let rows = sqlx::query_as::<_, CachedWorkout>(
            r#"
            SELECT w.* FROM cached_workouts w
            JOIN sessions s ON s.id = w.session_id
            WHERE w.user_id = ? AND s.source = 'whoop'
            ORDER BY w.start_time
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    /// The workout already linked to a session, if any.
    pub async fn workout_linked_to_session(
        &self,
        user_id: i64,
        session_id: i64,
    ) -> Result<Option<CachedWorkout>, AppError> {
        let row = sqlx::query_as::<_, CachedWorkout>(
            "SELECT * FROM cached_workouts WHERE user_id = ? AND session_id = ?",
        )
        .bind(user_id)
        .bind(session_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    /// Record the workout → session link.
    pub async fn link_workout_to_session(
        &self,
        cache_id: i64,
        session_id: i64,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE cached_workouts SET session_id = ? WHERE id = ?")
            .bind(session_id)
            .bind(cache_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn count_cached_workouts(&self, user_id: i64) -> Result<i64, AppError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM cached_workouts WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(self.pool())
                .await?;
        Ok(count)
    }

    /// Drop a user's entire workout cache (disconnect path).
    pub async fn delete_workouts_for_user(&self, user_id: i64) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM cached_workouts WHERE user_id = ?")
            .bind(user_id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    // ─── Recovery Cycle Cache ────────────────────────────────────

    /// Insert or fully overwrite a cached recovery cycle.
    pub async fn upsert_recovery_cycle(
        &self,
        cycle: &NewCachedRecoveryCycle,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO cached_recovery_cycles
                (user_id, cycle_id, cycle_start, cycle_end, recovery_score,
                 resting_heart_rate, hrv_rmssd_milli, spo2_percentage,
                 skin_temp_celsius, sleep_json, raw_json, synced_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id, cycle_id) DO UPDATE SET
                cycle_start = excluded.cycle_start,
                cycle_end = excluded.cycle_end,
                recovery_score = excluded.recovery_score,
                resting_heart_rate = excluded.resting_heart_rate,
                hrv_rmssd_milli = excluded.hrv_rmssd_milli,
                spo2_percentage = excluded.spo2_percentage,
                skin_temp_celsius = excluded.skin_temp_celsius,
                sleep_json = excluded.sleep_json,
                raw_json = excluded.raw_json,
                synced_at = excluded.synced_at
            "#,
        )
        .bind(cycle.user_id)
        .bind(cycle.cycle_id)
        .bind(cycle.cycle_start)
        .bind(cycle.cycle_end)
        .bind(cycle.recovery_score)
        .bind(cycle.resting_heart_rate)
        .bind(cycle.hrv_rmssd_milli)
        .bind(cycle.spo2_percentage)
        .bind(cycle.skin_temp_celsius)
        .bind(&cycle.sleep_json)
        .bind(&cycle.raw_json)
        .bind(cycle.synced_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Get one cached cycle by its WHOOP cycle id.
    pub async fn get_recovery_cycle(
        &self,
        user_id: i64,
        cycle_id: i64,
    ) -> Result<Option<CachedRecoveryCycle>, AppError> {
        let row = sqlx::query_as::<_, CachedRecoveryCycle>(
            "SELECT * FROM cached_recovery_cycles WHERE user_id = ? AND cycle_id = ?",
        )
        .bind(user_id)
        .bind(cycle_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    /// Most recent cycle by start time.
    pub async fn latest_recovery_cycle(
        &self,
        user_id: i64,
    ) -> Result<Option<CachedRecoveryCycle>, AppError> {
        let row = sqlx::query_as::<_, CachedRecoveryCycle>(
            r#"
            SELECT * FROM cached_recovery_cycles
            WHERE user_id = ?
            ORDER BY cycle_start DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn count_recovery_cycles(&self, user_id: i64) -> Result<i64, AppError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM cached_recovery_cycles WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(self.pool())
                .await?;
        Ok(count)
    }

    /// Drop a user's entire recovery cache (disconnect path).
    pub async fn delete_recovery_for_user(&self, user_id: i64) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM cached_recovery_cycles WHERE user_id = ?")
            .bind(user_id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }
}
