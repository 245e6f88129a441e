//! Local caches of WHOOP workouts and recovery cycles.
//!
//! Cache rows are upserted by (user, external id); re-syncing an
//! overlapping window overwrites payload fields and never duplicates rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One imported WHOOP workout.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CachedWorkout {
    /// Local row ID
    pub id: i64,
    pub user_id: i64,
    /// WHOOP workout ID (UUID string)
    pub whoop_workout_id: String,
    /// Workout start (UTC)
    pub start_time: DateTime<Utc>,
    /// Workout end (UTC)
    pub end_time: DateTime<Utc>,
    /// Provider-reported local offset, e.g. "-08:00" or "+05:30"
    pub timezone_offset: String,
    pub sport_id: Option<i64>,
    pub sport_name: Option<String>,
    pub strain: Option<f64>,
    pub average_heart_rate: Option<i64>,
    pub max_heart_rate: Option<i64>,
    pub kilojoules: Option<f64>,
    /// Active calories; derived from kilojoules when WHOOP omits it
    pub calories: Option<i64>,
    /// Heart-rate zone breakdown, serialized [`ZoneDurations`]
    pub zone_durations_json: Option<String>,
    /// Full provider payload for forward compatibility
    pub raw_json: Option<String>,
    /// Linked journal session, once matched or auto-created
    pub session_id: Option<i64>,
    pub synced_at: DateTime<Utc>,
}

impl CachedWorkout {
    /// Workout duration in whole seconds.
    pub fn duration_seconds(&self) -> i64 {
        (self.end_time - self.start_time).num_seconds()
    }

    /// Parsed zone breakdown, if stored.
    pub fn zone_durations(&self) -> Option<ZoneDurations> {
        self.zone_durations_json
            .as_deref()
            .and_then(|json| serde_json::from_str(json).ok())
    }
}

/// For upserting workout rows (without local id / link state).
#[derive(Debug, Clone)]
pub struct NewCachedWorkout {
    pub user_id: i64,
    pub whoop_workout_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub timezone_offset: String,
    pub sport_id: Option<i64>,
    pub sport_name: Option<String>,
    pub strain: Option<f64>,
    pub average_heart_rate: Option<i64>,
    pub max_heart_rate: Option<i64>,
    pub kilojoules: Option<f64>,
    pub calories: Option<i64>,
    pub zone_durations_json: Option<String>,
    pub raw_json: Option<String>,
    pub synced_at: DateTime<Utc>,
}

/// For upserting cycle rows (without local id).
#[derive(Debug, Clone)]
pub struct NewCachedRecoveryCycle {
    pub user_id: i64,
    pub cycle_id: i64,
    pub cycle_start: DateTime<Utc>,
    pub cycle_end: Option<DateTime<Utc>>,
    pub recovery_score: Option<f64>,
    pub resting_heart_rate: Option<f64>,
    pub hrv_rmssd_milli: Option<f64>,
    pub spo2_percentage: Option<f64>,
    pub skin_temp_celsius: Option<f64>,
    pub sleep_json: Option<String>,
    pub raw_json: Option<String>,
    pub synced_at: DateTime<Utc>,
}

/// Time spent in each heart-rate zone, in milliseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZoneDurations {
    #[serde(default)]
    pub zone_zero_milli: Option<i64>,
    #[serde(default)]
    pub zone_one_milli: Option<i64>,
    #[serde(default)]
    pub zone_two_milli: Option<i64>,
    #[serde(default)]
    pub zone_three_milli: Option<i64>,
    #[serde(default)]
    pub zone_four_milli: Option<i64>,
    #[serde(default)]
    pub zone_five_milli: Option<i64>,
}

/// One imported WHOOP physiological cycle with recovery and sleep scores.
///
/// A cycle missing its recovery or sleep data still produces a row; the
/// absent fields stay null until a later sync fills them in.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CachedRecoveryCycle {
    /// Local row ID
    pub id: i64,
    pub user_id: i64,
    /// WHOOP cycle ID (numeric)
    pub cycle_id: i64,
    pub cycle_start: DateTime<Utc>,
    /// Null while the cycle is still in progress
    pub cycle_end: Option<DateTime<Utc>>,
    /// Recovery score, 0-100
    pub recovery_score: Option<f64>,
    pub resting_heart_rate: Option<f64>,
    /// Heart-rate variability (RMSSD, milliseconds)
    pub hrv_rmssd_milli: Option<f64>,
    /// Blood oxygen saturation percentage
    pub spo2_percentage: Option<f64>,
    pub skin_temp_celsius: Option<f64>,
    /// Sleep-stage breakdown, serialized [`SleepBreakdown`]
    pub sleep_json: Option<String>,
    /// Full provider payload for forward compatibility
    pub raw_json: Option<String>,
    pub synced_at: DateTime<Utc>,
}

impl CachedRecoveryCycle {
    /// Parsed sleep breakdown, if stored.
    pub fn sleep(&self) -> Option<SleepBreakdown> {
        self.sleep_json
            .as_deref()
            .and_then(|json| serde_json::from_str(json).ok())
    }
}

/// Sleep-stage summary for one cycle, in milliseconds unless noted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SleepBreakdown {
    /// Sleep performance percentage, 0-100
    #[serde(default)]
    pub performance_percentage: Option<f64>,
    #[serde(default)]
    pub total_in_bed_milli: Option<i64>,
    #[serde(default)]
    pub sleep_need_milli: Option<i64>,
    #[serde(default)]
    pub sleep_debt_milli: Option<i64>,
    #[serde(default)]
    pub light_sleep_milli: Option<i64>,
    #[serde(default)]
    pub slow_wave_sleep_milli: Option<i64>,
    #[serde(default)]
    pub rem_sleep_milli: Option<i64>,
    #[serde(default)]
    pub awake_milli: Option<i64>,
}
