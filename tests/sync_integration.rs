// SPDX-License-Identifier: MIT

//! Sync Engine integration tests against a mock WHOOP API.

mod common;

use chrono::{Duration, TimeZone, Utc};
use mockito::Matcher;
use serde_json::json;
use training_journal::models::NewCachedRecoveryCycle;
use training_journal::services::sync::StepOutcome;

use common::{create_test_app, seed_connection, seed_connection_with_flags};

fn workout_record(id: &str, start: &str, end: &str, strain: f64) -> serde_json::Value {
    json!({
        "id": id,
        "user_id": 42,
        "start": start,
        "end": end,
        "timezone_offset": "-07:00",
        "sport_id": 1,
        "sport_name": "running",
        "score_state": "SCORED",
        "score": {
            "strain": strain,
            "average_heart_rate": 140,
            "max_heart_rate": 172,
            "kilojoule": 1000.0,
            "zone_durations": {
                "zone_zero_milli": 60000,
                "zone_one_milli": 300000,
                "zone_two_milli": 900000
            }
        }
    })
}

fn page(records: Vec<serde_json::Value>, next_token: Option<&str>) -> String {
    json!({"records": records, "next_token": next_token}).to_string()
}

#[tokio::test]
async fn test_workout_sync_is_idempotent() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/developer/v2/activity/workout")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(page(
            vec![
                workout_record("w-1", "2024-06-10T16:00:00Z", "2024-06-10T17:00:00Z", 10.0),
                workout_record("w-2", "2024-06-11T16:00:00Z", "2024-06-11T17:10:00Z", 12.5),
            ],
            None,
        ))
        .create_async()
        .await;

    let app = create_test_app(&server.url()).await;
    seed_connection(&app.state.db, 1, 42, 3600).await;

    let first = app.state.sync.sync_workouts(1, 7).await.unwrap();
    assert_eq!(first.workouts_synced, 2);
    assert_eq!(app.state.db.count_cached_workouts(1).await.unwrap(), 2);

    // Re-running over the same window updates in place, never duplicates
    let second = app.state.sync.sync_workouts(1, 7).await.unwrap();
    assert_eq!(second.workouts_synced, 2);
    assert_eq!(app.state.db.count_cached_workouts(1).await.unwrap(), 2);

    // Auto-create disabled on this connection: reported, not silent
    assert!(matches!(second.auto_create, StepOutcome::Skipped { .. }));

    let connection = app.state.db.get_connection(1).await.unwrap().unwrap();
    assert!(connection.last_synced_at.is_some());
}

#[tokio::test]
async fn test_workout_sync_follows_pagination_cursor() {
    let mut server = mockito::Server::new_async().await;

    // Default mock: first page, carries a continuation cursor
    server
        .mock("GET", "/developer/v2/activity/workout")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(page(
            vec![
                workout_record("w-1", "2024-06-10T16:00:00Z", "2024-06-10T17:00:00Z", 10.0),
                workout_record("w-2", "2024-06-11T16:00:00Z", "2024-06-11T17:00:00Z", 11.0),
            ],
            Some("cursor-2"),
        ))
        .create_async()
        .await;

    // Registered later, so it wins for requests carrying the cursor
    server
        .mock("GET", "/developer/v2/activity/workout")
        .match_query(Matcher::UrlEncoded("nextToken".into(), "cursor-2".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(page(
            vec![workout_record(
                "w-3",
                "2024-06-12T16:00:00Z",
                "2024-06-12T17:00:00Z",
                9.0,
            )],
            None,
        ))
        .create_async()
        .await;

    let app = create_test_app(&server.url()).await;
    seed_connection(&app.state.db, 1, 42, 3600).await;

    let report = app.state.sync.sync_workouts(1, 7).await.unwrap();
    assert_eq!(report.workouts_synced, 3);
    assert_eq!(report.pages_fetched, 2);
    assert!(!report.truncated);
    assert_eq!(app.state.db.count_cached_workouts(1).await.unwrap(), 3);
}

#[tokio::test]
async fn test_workout_sync_derives_calories_from_kilojoules() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/developer/v2/activity/workout")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(page(
            vec![workout_record(
                "w-1",
                "2024-06-10T16:00:00Z",
                "2024-06-10T17:00:00Z",
                10.0,
            )],
            None,
        ))
        .create_async()
        .await;

    let app = create_test_app(&server.url()).await;
    seed_connection(&app.state.db, 1, 42, 3600).await;

    app.state.sync.sync_workouts(1, 7).await.unwrap();

    let workouts = app.state.db.unlinked_workouts(1).await.unwrap();
    // 1000 kJ / 4.184 kJ per kcal, rounded
    assert_eq!(workouts[0].calories, Some(239));
    assert_eq!(workouts[0].timezone_offset, "-07:00");
    assert!(workouts[0].zone_durations().is_some());
    assert!(workouts[0].raw_json.is_some());
}

#[tokio::test]
async fn test_workout_sync_overwrites_stale_fields() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/developer/v2/activity/workout")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(page(
            vec![workout_record(
                "w-1",
                "2024-06-10T16:00:00Z",
                "2024-06-10T17:00:00Z",
                10.0,
            )],
            None,
        ))
        .expect(1)
        .create_async()
        .await;

    let app = create_test_app(&server.url()).await;
    seed_connection(&app.state.db, 1, 42, 3600).await;
    app.state.sync.sync_workouts(1, 7).await.unwrap();

    // Upstream rescored the workout; the newer mock takes precedence
    server
        .mock("GET", "/developer/v2/activity/workout")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(page(
            vec![workout_record(
                "w-1",
                "2024-06-10T16:00:00Z",
                "2024-06-10T17:00:00Z",
                15.5,
            )],
            None,
        ))
        .create_async()
        .await;

    app.state.sync.sync_workouts(1, 7).await.unwrap();

    let workouts = app.state.db.unlinked_workouts(1).await.unwrap();
    assert_eq!(workouts.len(), 1);
    assert_eq!(workouts[0].strain, Some(15.5));
}

#[tokio::test]
async fn test_sync_auto_creates_sessions_when_enabled() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/developer/v2/activity/workout")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(page(
            vec![workout_record(
                "w-1",
                "2024-06-10T16:00:00Z",
                "2024-06-10T17:00:00Z",
                10.0,
            )],
            None,
        ))
        .create_async()
        .await;

    let app = create_test_app(&server.url()).await;
    seed_connection_with_flags(&app.state.db, 1, 42, 3600, true, false).await;

    let report = app.state.sync.sync_workouts(1, 7).await.unwrap();
    assert!(matches!(report.auto_create, StepOutcome::Completed { count: 1 }));

    // The workout is linked; a second sync creates nothing new
    let report = app.state.sync.sync_workouts(1, 7).await.unwrap();
    assert!(matches!(report.auto_create, StepOutcome::Completed { count: 0 }));
}

// ─── Recovery ────────────────────────────────────────────────

async fn recovery_mocks(
    server: &mut mockito::Server,
) -> (mockito::Mock, mockito::Mock, mockito::Mock) {
    let cycles = server
        .mock("GET", "/developer/v2/cycle")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(page(
            vec![
                json!({
                    "id": 101,
                    "user_id": 42,
                    "start": "2024-06-10T04:00:00Z",
                    "end": "2024-06-11T04:00:00Z"
                }),
                json!({
                    "id": 102,
                    "user_id": 42,
                    "start": "2024-06-11T04:00:00Z",
                    "end": null
                }),
            ],
            None,
        ))
        .create_async()
        .await;

    let recoveries = server
        .mock("GET", "/developer/v2/recovery")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(page(
            vec![json!({
                "cycle_id": 101,
                "sleep_id": "s-1",
                "user_id": 42,
                "score": {
                    "recovery_score": 92.0,
                    "resting_heart_rate": 48.0,
                    "hrv_rmssd_milli": 85.0,
                    "spo2_percentage": 97.5,
                    "skin_temp_celsius": 33.1
                }
            })],
            None,
        ))
        .create_async()
        .await;

    let sleeps = server
        .mock("GET", "/developer/v2/activity/sleep")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(page(
            vec![json!({
                "id": "s-1",
                "user_id": 42,
                "score": {
                    "sleep_performance_percentage": 88.0,
                    "stage_summary": {
                        "total_in_bed_time_milli": 28800000_i64,
                        "total_awake_time_milli": 1800000,
                        "total_light_sleep_time_milli": 14400000,
                        "total_slow_wave_sleep_time_milli": 7200000,
                        "total_rem_sleep_time_milli": 5400000
                    },
                    "sleep_needed": {
                        "baseline_milli": 27000000,
                        "need_from_sleep_debt_milli": 900000
                    }
                }
            })],
            None,
        ))
        .create_async()
        .await;

    (cycles, recoveries, sleeps)
}

#[tokio::test]
async fn test_recovery_sync_joins_cycles_recovery_and_sleep() {
    let mut server = mockito::Server::new_async().await;
    let (cycles, recoveries, sleeps) = recovery_mocks(&mut server).await;

    let app = create_test_app(&server.url()).await;
    seed_connection(&app.state.db, 1, 42, 3600).await;

    let report = app.state.sync.sync_recovery(1, 7).await.unwrap();
    cycles.assert_async().await;
    recoveries.assert_async().await;
    sleeps.assert_async().await;

    assert_eq!(report.cycles_synced, 2);
    assert_eq!(app.state.db.count_recovery_cycles(1).await.unwrap(), 2);

    // Cycle 102 has no recovery or sleep: still a row, fields null
    let latest = app.state.db.latest_recovery_cycle(1).await.unwrap().unwrap();
    assert_eq!(latest.cycle_id, 102);
    assert!(latest.recovery_score.is_none());
    assert!(latest.sleep_json.is_none());
}

#[tokio::test]
async fn test_recovery_sync_merges_scores_and_sleep_breakdown() {
    let mut server = mockito::Server::new_async().await;
    recovery_mocks(&mut server).await;

    let app = create_test_app(&server.url()).await;
    seed_connection(&app.state.db, 1, 42, 3600).await;
    app.state.sync.sync_recovery(1, 7).await.unwrap();

    // Idempotent re-run
    app.state.sync.sync_recovery(1, 7).await.unwrap();
    assert_eq!(app.state.db.count_recovery_cycles(1).await.unwrap(), 2);

    let row = app.state.db.get_recovery_cycle(1, 101).await.unwrap().unwrap();
    assert_eq!(row.recovery_score, Some(92.0));
    assert_eq!(row.resting_heart_rate, Some(48.0));
    assert_eq!(row.hrv_rmssd_milli, Some(85.0));

    let sleep = row.sleep().expect("sleep breakdown stored");
    assert_eq!(sleep.performance_percentage, Some(88.0));
    assert_eq!(sleep.rem_sleep_milli, Some(5400000));
    assert_eq!(sleep.slow_wave_sleep_milli, Some(7200000));
    assert_eq!(sleep.sleep_debt_milli, Some(900000));
}

#[tokio::test]
async fn test_recovery_autofill_maps_high_score_to_max_ratings() {
    let mut server = mockito::Server::new_async().await;
    recovery_mocks(&mut server).await;

    let app = create_test_app(&server.url()).await;
    seed_connection_with_flags(&app.state.db, 1, 42, 3600, false, true).await;

    let report = app.state.sync.sync_recovery(1, 7).await.unwrap();
    // Cycle 101 scored 92; cycle 102 has no score yet
    assert!(matches!(report.readiness_autofill, StepOutcome::Completed { count: 1 }));

    let date = chrono::NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
    let entry = app.state.db.get_readiness_entry(1, date).await.unwrap().unwrap();
    assert_eq!(entry.sleep_quality, 5);
    assert_eq!(entry.energy_level, 5);
    assert_eq!(entry.source, "whoop");
}

#[tokio::test]
async fn test_recovery_autofill_maps_mid_score_to_mid_ratings() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/developer/v2/cycle")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(page(
            vec![json!({
                "id": 201,
                "user_id": 42,
                "start": "2024-06-12T04:00:00Z",
                "end": "2024-06-13T04:00:00Z"
            })],
            None,
        ))
        .create_async()
        .await;
    server
        .mock("GET", "/developer/v2/recovery")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(page(
            vec![json!({
                "cycle_id": 201,
                "sleep_id": null,
                "user_id": 42,
                "score": {"recovery_score": 60.0, "resting_heart_rate": 55.0}
            })],
            None,
        ))
        .create_async()
        .await;
    server
        .mock("GET", "/developer/v2/activity/sleep")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(page(vec![], None))
        .create_async()
        .await;

    let app = create_test_app(&server.url()).await;
    seed_connection_with_flags(&app.state.db, 1, 42, 3600, false, true).await;
    app.state.sync.sync_recovery(1, 7).await.unwrap();

    let date = chrono::NaiveDate::from_ymd_opt(2024, 6, 12).unwrap();
    let entry = app.state.db.get_readiness_entry(1, date).await.unwrap().unwrap();
    assert_eq!(entry.sleep_quality, 3);
    assert_eq!(entry.energy_level, 3);
}

#[tokio::test]
async fn test_autofill_never_overwrites_manual_entries() {
    let mut server = mockito::Server::new_async().await;
    recovery_mocks(&mut server).await;

    let app = create_test_app(&server.url()).await;
    seed_connection_with_flags(&app.state.db, 1, 42, 3600, false, true).await;

    // User already checked in manually that day
    let date = chrono::NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
    app.state
        .db
        .upsert_readiness_entry(&training_journal::models::ReadinessEntry {
            user_id: 1,
            date,
            sleep_quality: 2,
            energy_level: 2,
            source: "manual".to_string(),
        })
        .await
        .unwrap();

    app.state.sync.sync_recovery(1, 7).await.unwrap();

    let entry = app.state.db.get_readiness_entry(1, date).await.unwrap().unwrap();
    assert_eq!(entry.sleep_quality, 2);
    assert_eq!(entry.source, "manual");
}

#[tokio::test]
async fn test_get_latest_recovery_returns_fresh_cache_without_fetching() {
    // No mocks registered: any HTTP call would fail the test
    let app = create_test_app("http://localhost:9").await;
    seed_connection(&app.state.db, 1, 42, 3600).await;

    let now = Utc::now();
    app.state
        .db
        .upsert_recovery_cycle(&NewCachedRecoveryCycle {
            user_id: 1,
            cycle_id: 55,
            cycle_start: now - Duration::hours(8),
            cycle_end: None,
            recovery_score: Some(77.0),
            resting_heart_rate: Some(50.0),
            hrv_rmssd_milli: Some(70.0),
            spo2_percentage: None,
            skin_temp_celsius: None,
            sleep_json: None,
            raw_json: None,
            synced_at: now - Duration::hours(1),
        })
        .await
        .unwrap();

    let latest = app.state.sync.get_latest_recovery(1).await.unwrap();
    assert_eq!(latest.cycle_id, 55);
    assert_eq!(latest.recovery_score, Some(77.0));
}

#[tokio::test]
async fn test_get_latest_recovery_resyncs_stale_cache() {
    let mut server = mockito::Server::new_async().await;
    let (cycles, _, _) = recovery_mocks(&mut server).await;

    let app = create_test_app(&server.url()).await;
    seed_connection(&app.state.db, 1, 42, 3600).await;

    // Cached row synced five hours ago: stale past the 4-hour threshold.
    // Its cycle predates the ones upstream will return.
    let now = Utc::now();
    app.state
        .db
        .upsert_recovery_cycle(&NewCachedRecoveryCycle {
            user_id: 1,
            cycle_id: 55,
            cycle_start: Utc.with_ymd_and_hms(2024, 6, 1, 4, 0, 0).unwrap(),
            cycle_end: None,
            recovery_score: Some(40.0),
            resting_heart_rate: None,
            hrv_rmssd_milli: None,
            spo2_percentage: None,
            skin_temp_celsius: None,
            sleep_json: None,
            raw_json: None,
            synced_at: now - Duration::hours(5),
        })
        .await
        .unwrap();

    let latest = app.state.sync.get_latest_recovery(1).await.unwrap();
    cycles.assert_async().await;

    // The resync pulled newer cycles; the freshest one wins
    assert_eq!(latest.cycle_id, 102);
}
