// SPDX-License-Identifier: MIT

use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::mpsc;
use training_journal::config::Config;
use training_journal::db::Db;
use training_journal::models::WhoopConnection;
use training_journal::routes::create_router;
use training_journal::services::jobs::SyncJob;
use training_journal::services::{
    AutoSessionService, MatchingService, SyncEngine, SyncQueue, TokenCipher, WhoopClient,
    WhoopService,
};
use training_journal::AppState;

/// Plaintext tokens used by seeded connections.
#[allow(dead_code)]
pub const TEST_ACCESS_TOKEN: &str = "test-access-token";
#[allow(dead_code)]
pub const TEST_REFRESH_TOKEN: &str = "test-refresh-token";

/// A fully wired app against an in-memory database.
///
/// The queue receiver is kept (no worker is spawned) so tests can assert
/// what the webhook handler enqueued.
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    #[allow(dead_code)]
    pub queue_rx: mpsc::Receiver<SyncJob>,
}

/// Create a test app. `whoop_api_base` should point at a mockito server
/// when the test exercises provider HTTP calls.
#[allow(dead_code)]
pub async fn create_test_app(whoop_api_base: &str) -> TestApp {
    let mut config = Config::test_default();
    config.whoop_api_base = whoop_api_base.to_string();

    let db = Db::connect_in_memory()
        .await
        .expect("Failed to create in-memory database");

    let cipher = TokenCipher::new(&config.token_encryption_key).expect("cipher");
    let client = WhoopClient::new(
        config.whoop_client_id.clone(),
        config.whoop_client_secret.clone(),
        config.whoop_api_base.clone(),
    );
    let whoop = WhoopService::new(client, db.clone(), cipher);
    let auto_sessions = AutoSessionService::new(db.clone());
    let sync = SyncEngine::new(whoop.clone(), db.clone(), auto_sessions.clone());
    let matching = MatchingService::new(db.clone(), sync.clone());
    let (sync_queue, queue_rx) = SyncQueue::new();

    let state = Arc::new(AppState {
        config,
        db,
        whoop,
        sync,
        matching,
        auto_sessions,
        sync_queue,
    });

    TestApp {
        router: create_router(state.clone()),
        state,
        queue_rx,
    }
}

/// The cipher used for seeded connections (same key as `test_default`).
#[allow(dead_code)]
pub fn test_cipher() -> TokenCipher {
    TokenCipher::new(&Config::test_default().token_encryption_key).expect("cipher")
}

/// Insert a connection whose access token expires `expires_in_secs` from
/// now, with encrypted copies of the test tokens.
#[allow(dead_code)]
pub async fn seed_connection(
    db: &Db,
    user_id: i64,
    whoop_user_id: i64,
    expires_in_secs: i64,
) -> WhoopConnection {
    seed_connection_with_flags(db, user_id, whoop_user_id, expires_in_secs, false, false).await
}

/// Like [`seed_connection`] but with explicit integration flags.
#[allow(dead_code)]
pub async fn seed_connection_with_flags(
    db: &Db,
    user_id: i64,
    whoop_user_id: i64,
    expires_in_secs: i64,
    auto_create_sessions: bool,
    auto_fill_readiness: bool,
) -> WhoopConnection {
    let cipher = test_cipher();
    let now = Utc::now();
    let connection = WhoopConnection {
        user_id,
        whoop_user_id,
        access_token_encrypted: cipher.encrypt(TEST_ACCESS_TOKEN).unwrap(),
        refresh_token_encrypted: cipher.encrypt(TEST_REFRESH_TOKEN).unwrap(),
        token_expires_at: now + Duration::seconds(expires_in_secs),
        scopes: "offline read:workout read:recovery".to_string(),
        auto_create_sessions,
        auto_fill_readiness,
        last_synced_at: None,
        is_active: true,
        created_at: now,
    };
    db.upsert_connection(&connection).await.expect("seed connection");
    connection
}

/// Bearer token for the API routes.
#[allow(dead_code)]
pub fn bearer_token(user_id: i64) -> String {
    let config = Config::test_default();
    let jwt = training_journal::middleware::auth::create_jwt(user_id, &config.jwt_signing_key)
        .expect("jwt");
    format!("Bearer {}", jwt)
}
