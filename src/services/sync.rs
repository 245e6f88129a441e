// SPDX-License-Identifier: MIT

//! Sync Engine: paginated fetch from WHOOP with idempotent cache upserts.
//!
//! Workflow per sync:
//! 1. Obtain a valid access token
//! 2. Follow the provider's continuation cursor page by page (capped)
//! 3. Upsert each record keyed by (user, external id)
//! 4. Run follow-on steps (auto-create, timezone repair, readiness
//!    auto-fill) with their outcomes reported explicitly - a failing
//!    follow-on never fails the sync

use crate::db::Db;
use crate::error::{AppError, Result};
use crate::models::{NewCachedRecoveryCycle, NewCachedWorkout, ReadinessEntry, SleepBreakdown};
use crate::services::autosession::AutoSessionService;
use crate::services::whoop::{
    WhoopCycle, WhoopRecovery, WhoopService, WhoopSleep, WhoopWorkout,
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// Hard cap on pages per collection per sync; a misbehaving cursor must
/// not loop forever.
const MAX_SYNC_PAGES: u32 = 25;

/// A cached recovery row older than this triggers a resync on read.
const RECOVERY_STALE_AFTER_HOURS: i64 = 4;

/// Window used when a read-path sync is needed before recovery lookup.
const RECOVERY_RESYNC_DAYS: i64 = 2;

/// kJ per kcal, for deriving calories when WHOOP reports only energy.
const KILOJOULES_PER_CALORIE: f64 = 4.184;

/// Outcome of one follow-on step, reported instead of logged-and-lost.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Completed { count: u32 },
    Skipped { reason: String },
    Failed { reason: String },
}

/// Result of a workout sync, including follow-on step outcomes.
#[derive(Debug, Clone, Serialize)]
pub struct WorkoutSyncReport {
    pub workouts_synced: u32,
    pub pages_fetched: u32,
    /// True when the page cap cut the listing short
    pub truncated: bool,
    pub auto_create: StepOutcome,
    pub timezone_backfill: StepOutcome,
}

/// Result of a recovery sync.
#[derive(Debug, Clone, Serialize)]
pub struct RecoverySyncReport {
    pub cycles_synced: u32,
    pub truncated: bool,
    pub readiness_autofill: StepOutcome,
}

/// Orchestrates provider fetches and cache writes.
#[derive(Clone)]
pub struct SyncEngine {
    whoop: WhoopService,
    db: Db,
    auto_sessions: AutoSessionService,
}

impl SyncEngine {
    pub fn new(whoop: WhoopService, db: Db, auto_sessions: AutoSessionService) -> Self {
        Self {
            whoop,
            db,
            auto_sessions,
        }
    }

    // ─── Workouts ────────────────────────────────────────────────

    /// Sync workouts for the window `[now - days_back, now]`.
    pub async fn sync_workouts(&self, user_id: i64, days_back: i64) -> Result<WorkoutSyncReport> {
        let access_token = self.whoop.get_valid_access_token(user_id).await?;
        let now = Utc::now();
        let start = now - Duration::days(days_back);

        let mut synced = 0u32;
        let mut pages = 0u32;
        let mut truncated = false;
        let mut next_token: Option<String> = None;

        loop {
            let page = self
                .whoop
                .client()
                .list_workouts(&access_token, start, now, next_token.as_deref())
                .await?;
            pages += 1;

            if page.records.is_empty() {
                break;
            }

            for raw in &page.records {
                let workout: WhoopWorkout = match serde_json::from_value(raw.clone()) {
                    Ok(w) => w,
                    Err(e) => {
                        tracing::warn!(error = %e, user_id, "Skipping malformed workout record");
                        continue;
                    }
                };
                self.db
                    .upsert_workout(&cached_workout_from(user_id, &workout, raw, now))
                    .await?;
                synced += 1;
            }

            next_token = page.next_token;
            if next_token.is_none() {
                break;
            }
            if pages >= MAX_SYNC_PAGES {
                tracing::warn!(user_id, pages, "Workout sync hit page cap, truncating");
                truncated = true;
                break;
            }
        }

        self.db.touch_last_synced(user_id, now).await?;

        // Follow-on steps are outcome-isolated: each failure is reported,
        // never propagated.
        let auto_create = match self.auto_sessions.auto_create_sessions_for_workouts(user_id).await
        {
            Ok(Some(count)) => StepOutcome::Completed { count },
            Ok(None) => StepOutcome::Skipped {
                reason: "auto_create_sessions disabled".to_string(),
            },
            Err(e) => {
                tracing::warn!(error = %e, user_id, "Auto-session creation failed");
                StepOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        let timezone_backfill = match self.auto_sessions.backfill_session_timezones(user_id).await {
            Ok(count) => StepOutcome::Completed { count },
            Err(e) => {
                tracing::warn!(error = %e, user_id, "Timezone backfill failed");
                StepOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        tracing::info!(user_id, synced, pages, "Workout sync complete");

        Ok(WorkoutSyncReport {
            workouts_synced: synced,
            pages_fetched: pages,
            truncated,
            auto_create,
            timezone_backfill,
        })
    }

    // ─── Recovery ────────────────────────────────────────────────

    /// Sync recovery cycles for the window `[now - days_back, now]`.
    ///
    /// Cycles, recovery scores, and sleep scores are paginated
    /// independently and joined in memory by cycle id. A cycle with no
    /// recovery or sleep data still gets a row with those fields null.
    pub async fn sync_recovery(&self, user_id: i64, days_back: i64) -> Result<RecoverySyncReport> {
        let access_token = self.whoop.get_valid_access_token(user_id).await?;
        let now = Utc::now();
        let start = now - Duration::days(days_back);

        let mut truncated = false;

        let cycles: Vec<WhoopCycle> = self
            .fetch_all(user_id, &mut truncated, |token| {
                let access_token = access_token.clone();
                async move {
                    self.whoop
                        .client()
                        .list_cycles(&access_token, start, now, token.as_deref())
                        .await
                }
            })
            .await?;

        let recoveries: Vec<WhoopRecovery> = self
            .fetch_all(user_id, &mut truncated, |token| {
                let access_token = access_token.clone();
                async move {
                    self.whoop
                        .client()
                        .list_recoveries(&access_token, start, now, token.as_deref())
                        .await
                }
            })
            .await?;

        let sleeps: Vec<WhoopSleep> = self
            .fetch_all(user_id, &mut truncated, |token| {
                let access_token = access_token.clone();
                async move {
                    self.whoop
                        .client()
                        .list_sleeps(&access_token, start, now, token.as_deref())
                        .await
                }
            })
            .await?;

        let recovery_by_cycle: HashMap<i64, &WhoopRecovery> =
            recoveries.iter().map(|r| (r.cycle_id, r)).collect();
        let sleep_by_id: HashMap<&str, &WhoopSleep> =
            sleeps.iter().map(|s| (s.id.as_str(), s)).collect();

        let mut synced = 0u32;
        let mut rows = Vec::with_capacity(cycles.len());
        for cycle in &cycles {
            let recovery = recovery_by_cycle.get(&cycle.id).copied();
            let sleep = recovery
                .and_then(|r| r.sleep_id.as_deref())
                .and_then(|sleep_id| sleep_by_id.get(sleep_id).copied());

            let row = merged_cycle_row(user_id, cycle, recovery, sleep, now);
            self.db.upsert_recovery_cycle(&row).await?;
            rows.push(row);
            synced += 1;
        }

        self.db.touch_last_synced(user_id, now).await?;

        let readiness_autofill = match self.autofill_readiness(user_id, &rows).await {
            Ok(Some(count)) => StepOutcome::Completed { count },
            Ok(None) => StepOutcome::Skipped {
                reason: "auto_fill_readiness disabled".to_string(),
            },
            Err(e) => {
                tracing::warn!(error = %e, user_id, "Readiness auto-fill failed");
                StepOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        tracing::info!(user_id, synced, "Recovery sync complete");

        Ok(RecoverySyncReport {
            cycles_synced: synced,
            truncated,
            readiness_autofill,
        })
    }

    /// Latest cached recovery, refreshed first when stale (4 hours).
    pub async fn get_latest_recovery(
        &self,
        user_id: i64,
    ) -> Result<crate::models::CachedRecoveryCycle> {
        let stale_after = Duration::hours(RECOVERY_STALE_AFTER_HOURS);

        if let Some(latest) = self.db.latest_recovery_cycle(user_id).await? {
            if Utc::now() - latest.synced_at < stale_after {
                return Ok(latest);
            }
        }

        self.sync_recovery(user_id, RECOVERY_RESYNC_DAYS).await?;

        self.db
            .latest_recovery_cycle(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("No recovery data available".to_string()))
    }

    /// Map each synced recovery score onto that day's readiness check-in.
    /// Returns None when the connection has auto-fill disabled.
    async fn autofill_readiness(
        &self,
        user_id: i64,
        rows: &[NewCachedRecoveryCycle],
    ) -> Result<Option<u32>> {
        let connection = self
            .db
            .get_connection(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("WHOOP connection for user {}", user_id)))?;
        if !connection.auto_fill_readiness {
            return Ok(None);
        }

        let mut filled = 0u32;
        for row in rows {
            let Some(score) = row.recovery_score else {
                continue;
            };
            let (sleep_quality, energy_level) = readiness_ratings_for_score(score);
            self.db
                .upsert_readiness_entry(&ReadinessEntry {
                    user_id,
                    date: row.cycle_start.date_naive(),
                    sleep_quality,
                    energy_level,
                    source: "whoop".to_string(),
                })
                .await?;
            filled += 1;
        }
        Ok(Some(filled))
    }

    /// Drain a paginated collection into typed records, respecting the
    /// page cap and skipping records that fail to parse.
    async fn fetch_all<T, F, Fut>(
        &self,
        user_id: i64,
        truncated: &mut bool,
        fetch_page: F,
    ) -> Result<Vec<T>>
    where
        T: for<'de> serde::Deserialize<'de>,
        F: Fn(Option<String>) -> Fut,
        Fut: std::future::Future<Output = Result<crate::services::whoop::Page<serde_json::Value>>>,
    {
        let mut records = Vec::new();
        let mut pages = 0u32;
        let mut next_token: Option<String> = None;

        loop {
            let page = fetch_page(next_token.clone()).await?;
            pages += 1;

            if page.records.is_empty() {
                break;
            }

            for raw in page.records {
                match serde_json::from_value(raw) {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        tracing::warn!(error = %e, user_id, "Skipping malformed record");
                    }
                }
            }

            next_token = page.next_token;
            if next_token.is_none() {
                break;
            }
            if pages >= MAX_SYNC_PAGES {
                tracing::warn!(user_id, pages, "Sync hit page cap, truncating");
                *truncated = true;
                break;
            }
        }

        Ok(records)
    }
}

/// Build the cache row for one provider workout record.
fn cached_workout_from(
    user_id: i64,
    workout: &WhoopWorkout,
    raw: &serde_json::Value,
    synced_at: DateTime<Utc>,
) -> NewCachedWorkout {
    let score = workout.score.as_ref();
    let kilojoules = score.and_then(|s| s.kilojoule);
    let calories = score
        .and_then(|s| s.calories)
        .or_else(|| kilojoules.map(|kj| (kj / KILOJOULES_PER_CALORIE).round() as i64));

    NewCachedWorkout {
        user_id,
        whoop_workout_id: workout.id.clone(),
        start_time: workout.start,
        end_time: workout.end,
        timezone_offset: workout
            .timezone_offset
            .clone()
            .unwrap_or_else(|| "+00:00".to_string()),
        sport_id: workout.sport_id,
        sport_name: workout.sport_name.clone(),
        strain: score.and_then(|s| s.strain),
        average_heart_rate: score.and_then(|s| s.average_heart_rate),
        max_heart_rate: score.and_then(|s| s.max_heart_rate),
        kilojoules,
        calories,
        zone_durations_json: score
            .and_then(|s| s.zone_durations.as_ref())
            .and_then(|z| serde_json::to_string(z).ok()),
        raw_json: Some(raw.to_string()),
        synced_at,
    }
}

/// Merge one cycle with its recovery and sleep records into a cache row.
fn merged_cycle_row(
    user_id: i64,
    cycle: &WhoopCycle,
    recovery: Option<&WhoopRecovery>,
    sleep: Option<&WhoopSleep>,
    synced_at: DateTime<Utc>,
) -> NewCachedRecoveryCycle {
    let recovery_score = recovery.and_then(|r| r.score.as_ref());
    let sleep_score = sleep.and_then(|s| s.score.as_ref());

    let sleep_breakdown = sleep_score.map(|score| {
        let stages = score.stage_summary.as_ref();
        let needed = score.sleep_needed.as_ref();
        SleepBreakdown {
            performance_percentage: score.sleep_performance_percentage,
            total_in_bed_milli: stages.and_then(|s| s.total_in_bed_time_milli),
            sleep_need_milli: needed.and_then(|n| n.baseline_milli),
            sleep_debt_milli: needed.and_then(|n| n.need_from_sleep_debt_milli),
            light_sleep_milli: stages.and_then(|s| s.total_light_sleep_time_milli),
            slow_wave_sleep_milli: stages.and_then(|s| s.total_slow_wave_sleep_time_milli),
            rem_sleep_milli: stages.and_then(|s| s.total_rem_sleep_time_milli),
            awake_milli: stages.and_then(|s| s.total_awake_time_milli),
        }
    });

    let raw = serde_json::json!({
        "cycle_id": cycle.id,
        "has_recovery": recovery.is_some(),
        "has_sleep": sleep.is_some(),
    });

    NewCachedRecoveryCycle {
        user_id,
        cycle_id: cycle.id,
        cycle_start: cycle.start,
        cycle_end: cycle.end,
        recovery_score: recovery_score.and_then(|s| s.recovery_score),
        resting_heart_rate: recovery_score.and_then(|s| s.resting_heart_rate),
        hrv_rmssd_milli: recovery_score.and_then(|s| s.hrv_rmssd_milli),
        spo2_percentage: recovery_score.and_then(|s| s.spo2_percentage),
        skin_temp_celsius: recovery_score.and_then(|s| s.skin_temp_celsius),
        sleep_json: sleep_breakdown.and_then(|b| serde_json::to_string(&b).ok()),
        raw_json: Some(raw.to_string()),
        synced_at,
    }
}

/// Map a 0-100 recovery score onto 1-5 readiness ratings.
///
/// Used for both sleep quality and energy level: 81-100 → 5, 61-80 → 4,
/// 41-60 → 3, 21-40 → 2, 0-20 → 1.
pub fn readiness_ratings_for_score(score: f64) -> (i64, i64) {
    let rating = ((score / 20.0).ceil() as i64).clamp(1, 5);
    (rating, rating)
}
