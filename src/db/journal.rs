//! Operations on journal entities this subsystem consumes: sessions,
//! profiles, readiness check-ins. Full CRUD for these lives in the
//! journal proper; only the operations the integration needs are here.

use super::Db;
use crate::error::AppError;
use crate::models::{NewSession, Profile, ReadinessEntry, Session, WearableMetrics};
use chrono::{NaiveDate, NaiveTime};

impl Db {
    // ─── Sessions ────────────────────────────────────────────────

    pub async fn get_session(
        &self,
        user_id: i64,
        session_id: i64,
    ) -> Result<Option<Session>, AppError> {
        let row =
            sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE user_id = ? AND id = ?")
                .bind(user_id)
                .bind(session_id)
                .fetch_optional(self.pool())
                .await?;
        Ok(row)
    }

    pub async fn sessions_in_date_range(
        &self,
        user_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Session>, AppError> {
        let rows = sqlx::query_as::<_, Session>(
            r#"
            SELECT * FROM sessions
            WHERE user_id = ? AND date >= ? AND date <= ?
            ORDER BY date, class_time
            "#,
        )
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    /// Create a session, returning its ID (auto-creation path).
    pub async fn create_session(&self, session: &NewSession) -> Result<i64, AppError> {
        let metrics = session.metrics.unwrap_or_default();
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO sessions
                (user_id, date, class_time, duration_minutes, gym_name, class_type,
                 source, needs_review, whoop_strain, whoop_calories, whoop_avg_hr,
                 whoop_max_hr, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(session.user_id)
        .bind(session.date)
        .bind(session.class_time)
        .bind(session.duration_minutes)
        .bind(&session.gym_name)
        .bind(&session.class_type)
        .bind(&session.source)
        .bind(session.needs_review)
        .bind(metrics.strain)
        .bind(metrics.calories)
        .bind(metrics.average_heart_rate)
        .bind(metrics.max_heart_rate)
        .bind(chrono::Utc::now())
        .fetch_one(self.pool())
        .await?;
        Ok(id)
    }

    /// Copy wearable-derived biometrics onto a session.
    pub async fn update_session_wearable_metrics(
        &self,
        session_id: i64,
        metrics: &WearableMetrics,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE sessions
            SET whoop_strain = ?, whoop_calories = ?, whoop_avg_hr = ?, whoop_max_hr = ?
            WHERE id = ?
            "#,
        )
        .bind(metrics.strain)
        .bind(metrics.calories)
        .bind(metrics.average_heart_rate)
        .bind(metrics.max_heart_rate)
        .bind(session_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Correct a session's local date and time (timezone repair).
    pub async fn update_session_local_time(
        &self,
        session_id: i64,
        date: NaiveDate,
        class_time: NaiveTime,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE sessions SET date = ?, class_time = ? WHERE id = ?")
            .bind(date)
            .bind(class_time)
            .bind(session_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Null out wearable fields on every session linked to this user's
    /// cached workouts (disconnect path; runs before cache deletion).
    pub async fn clear_wearable_fields_for_user(&self, user_id: i64) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET whoop_strain = NULL, whoop_calories = NULL,
                whoop_avg_hr = NULL, whoop_max_hr = NULL
            WHERE id IN (
                SELECT session_id FROM cached_workouts
                WHERE user_id = ? AND session_id IS NOT NULL
            )
            "#,
        )
        .bind(user_id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }

    // ─── Profiles ────────────────────────────────────────────────

    pub async fn get_profile(&self, user_id: i64) -> Result<Option<Profile>, AppError> {
        let row = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row)
    }

    // ─── Readiness ───────────────────────────────────────────────

    /// Auto-fill a readiness entry. A manually logged entry for the same
    /// day is never overwritten.
    pub async fn upsert_readiness_entry(&self, entry: &ReadinessEntry) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO readiness_entries (user_id, date, sleep_quality, energy_level, source)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (user_id, date) DO UPDATE SET
                sleep_quality = excluded.sleep_quality,
                energy_level = excluded.energy_level,
                source = excluded.source
            WHERE readiness_entries.source != 'manual'
            "#,
        )
        .bind(entry.user_id)
        .bind(entry.date)
        .bind(entry.sleep_quality)
        .bind(entry.energy_level)
        .bind(&entry.source)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn get_readiness_entry(
        &self,
        user_id: i64,
        date: NaiveDate,
    ) -> Result<Option<ReadinessEntry>, AppError> {
        let row = sqlx::query_as::<_, ReadinessEntry>(
            "SELECT * FROM readiness_entries WHERE user_id = ? AND date = ?",
        )
        .bind(user_id)
        .bind(date)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }
}
