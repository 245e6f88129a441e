// SPDX-License-Identifier: MIT

//! API routes for authenticated users.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{CachedRecoveryCycle, ConnectionSummary, SleepBreakdown};
use crate::services::matching::WorkoutMatch;
use crate::services::sync::{RecoverySyncReport, WorkoutSyncReport};
use crate::AppState;
use axum::{
    extract::{Path, State},
    routing::{delete, get, patch, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/whoop/connection", get(get_connection))
        .route("/api/whoop/connection", patch(update_settings))
        .route("/api/whoop/connection", delete(disconnect))
        .route("/api/whoop/sync", post(sync_now))
        .route("/api/whoop/recovery/latest", get(latest_recovery))
        .route("/api/sessions/{id}/whoop-matches", get(get_matches))
        .route("/api/sessions/{id}/whoop-link", post(link_workout))
}

// ─── Connection ──────────────────────────────────────────────

/// Get the current user's WHOOP connection summary.
async fn get_connection(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ConnectionSummary>> {
    let connection = state
        .db
        .get_connection(user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Not connected to WHOOP".to_string()))?;

    Ok(Json(ConnectionSummary::from(&connection)))
}

#[derive(Deserialize)]
pub struct SettingsRequest {
    pub auto_create_sessions: bool,
    pub auto_fill_readiness: bool,
}

/// Update the integration flags on the connection.
async fn update_settings(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<SettingsRequest>,
) -> Result<Json<ConnectionSummary>> {
    let updated = state
        .db
        .update_connection_settings(
            user.user_id,
            payload.auto_create_sessions,
            payload.auto_fill_readiness,
        )
        .await?;
    if !updated {
        return Err(AppError::NotFound("Not connected to WHOOP".to_string()));
    }

    let connection = state
        .db
        .get_connection(user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Not connected to WHOOP".to_string()))?;
    Ok(Json(ConnectionSummary::from(&connection)))
}

#[derive(Serialize)]
pub struct DisconnectResponse {
    pub disconnected: bool,
}

/// Disconnect WHOOP and delete all imported data.
async fn disconnect(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<DisconnectResponse>> {
    let disconnected = state.whoop.disconnect(user.user_id).await?;
    Ok(Json(DisconnectResponse { disconnected }))
}

// ─── Sync ────────────────────────────────────────────────────

#[derive(Deserialize, Validate)]
pub struct SyncRequest {
    /// How far back to sync, in days
    #[validate(range(min = 1, max = 30))]
    pub days_back: i64,
}

#[derive(Serialize)]
pub struct SyncResponse {
    pub workouts: WorkoutSyncReport,
    pub recovery: RecoverySyncReport,
}

/// Run an on-demand sync of workouts and recovery.
async fn sync_now(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<SyncRequest>,
) -> Result<Json<SyncResponse>> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let workouts = state.sync.sync_workouts(user.user_id, payload.days_back).await?;
    let recovery = state.sync.sync_recovery(user.user_id, payload.days_back).await?;

    Ok(Json(SyncResponse { workouts, recovery }))
}

// ─── Recovery ────────────────────────────────────────────────

/// Latest recovery for the API, without raw payloads.
#[derive(Serialize)]
pub struct RecoveryResponse {
    pub cycle_id: i64,
    pub cycle_start: DateTime<Utc>,
    pub cycle_end: Option<DateTime<Utc>>,
    pub recovery_score: Option<f64>,
    pub resting_heart_rate: Option<f64>,
    pub hrv_rmssd_milli: Option<f64>,
    pub spo2_percentage: Option<f64>,
    pub skin_temp_celsius: Option<f64>,
    pub sleep: Option<SleepBreakdown>,
    pub synced_at: DateTime<Utc>,
}

impl From<CachedRecoveryCycle> for RecoveryResponse {
    fn from(cycle: CachedRecoveryCycle) -> Self {
        let sleep = cycle.sleep();
        Self {
            cycle_id: cycle.cycle_id,
            cycle_start: cycle.cycle_start,
            cycle_end: cycle.cycle_end,
            recovery_score: cycle.recovery_score,
            resting_heart_rate: cycle.resting_heart_rate,
            hrv_rmssd_milli: cycle.hrv_rmssd_milli,
            spo2_percentage: cycle.spo2_percentage,
            skin_temp_celsius: cycle.skin_temp_celsius,
            sleep,
            synced_at: cycle.synced_at,
        }
    }
}

/// Get the latest recovery, refreshing the cache when stale.
async fn latest_recovery(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<RecoveryResponse>> {
    let cycle = state.sync.get_latest_recovery(user.user_id).await?;
    Ok(Json(RecoveryResponse::from(cycle)))
}

// ─── Matching ────────────────────────────────────────────────

/// One proposed workout match, without raw payloads.
#[derive(Serialize)]
pub struct MatchCandidate {
    pub workout_cache_id: i64,
    pub whoop_workout_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub sport_name: Option<String>,
    pub strain: Option<f64>,
    pub calories: Option<i64>,
    pub overlap_pct: f64,
}

impl From<WorkoutMatch> for MatchCandidate {
    fn from(m: WorkoutMatch) -> Self {
        Self {
            workout_cache_id: m.workout.id,
            whoop_workout_id: m.workout.whoop_workout_id,
            start_time: m.workout.start_time,
            end_time: m.workout.end_time,
            sport_name: m.workout.sport_name,
            strain: m.workout.strain,
            calories: m.workout.calories,
            overlap_pct: m.overlap_pct,
        }
    }
}

/// Propose cached workouts overlapping a session, best match first.
async fn get_matches(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(session_id): Path<i64>,
) -> Result<Json<Vec<MatchCandidate>>> {
    let matches = state.matching.find_matches(user.user_id, session_id).await?;
    Ok(Json(matches.into_iter().map(MatchCandidate::from).collect()))
}

#[derive(Deserialize)]
pub struct LinkRequest {
    pub workout_cache_id: i64,
}

#[derive(Serialize)]
pub struct LinkResponse {
    pub linked: bool,
}

/// Apply a cached workout to a session.
async fn link_workout(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(session_id): Path<i64>,
    Json(payload): Json<LinkRequest>,
) -> Result<Json<LinkResponse>> {
    state
        .matching
        .apply_workout_to_session(user.user_id, session_id, payload.workout_cache_id)
        .await?;
    Ok(Json(LinkResponse { linked: true }))
}
