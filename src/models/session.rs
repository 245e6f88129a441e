//! Journal entities consumed by the integration: sessions, profiles,
//! readiness check-ins.
//!
//! Sessions and readiness CRUD belong to the journal proper; this
//! subsystem only consumes the operations below and the wearable-derived
//! extension fields.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// A logged training session.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    pub id: i64,
    pub user_id: i64,
    /// Local calendar date of the class
    pub date: NaiveDate,
    /// Local wall-clock start time
    pub class_time: NaiveTime,
    pub duration_minutes: i64,
    pub gym_name: String,
    pub class_type: String,
    /// "manual" for user-logged sessions, "whoop" for auto-created ones
    pub source: String,
    /// Auto-created sessions await user confirmation
    pub needs_review: bool,
    pub whoop_strain: Option<f64>,
    pub whoop_calories: Option<i64>,
    pub whoop_avg_hr: Option<i64>,
    pub whoop_max_hr: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Fields for creating a session (auto-creation path).
#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: i64,
    pub date: NaiveDate,
    pub class_time: NaiveTime,
    pub duration_minutes: i64,
    pub gym_name: String,
    pub class_type: String,
    pub source: String,
    pub needs_review: bool,
    pub metrics: Option<WearableMetrics>,
}

/// Wearable-derived biometrics copied onto a session when a workout links.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct WearableMetrics {
    pub strain: Option<f64>,
    pub calories: Option<i64>,
    pub average_heart_rate: Option<i64>,
    pub max_heart_rate: Option<i64>,
}

/// User profile defaults consumed by the auto-session creator.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Profile {
    pub user_id: i64,
    pub default_gym: Option<String>,
    pub default_class_type: Option<String>,
}

/// A daily readiness check-in (1-5 ratings).
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ReadinessEntry {
    pub user_id: i64,
    pub date: NaiveDate,
    pub sleep_quality: i64,
    pub energy_level: i64,
    /// "manual" or "whoop" when auto-filled from a recovery score
    pub source: String,
}
