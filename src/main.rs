// SPDX-License-Identifier: MIT

//! Training Journal WHOOP Integration Server
//!
//! Connects journal accounts to WHOOP: OAuth handshake, webhook-driven
//! sync of workouts and recovery into local caches, and matching of
//! imported workouts to logged sessions.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use training_journal::{
    config::Config,
    db::Db,
    services::{
        jobs::spawn_sync_worker, AutoSessionService, MatchingService, SyncEngine, SyncQueue,
        TokenCipher, WhoopClient, WhoopService,
    },
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting WHOOP integration API");

    // Initialize database and run migrations
    let db = Db::connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Token encryption
    let cipher =
        TokenCipher::new(&config.token_encryption_key).expect("Failed to initialize token cipher");

    // WHOOP client and services
    let client = WhoopClient::new(
        config.whoop_client_id.clone(),
        config.whoop_client_secret.clone(),
        config.whoop_api_base.clone(),
    );
    let whoop = WhoopService::new(client, db.clone(), cipher);
    let auto_sessions = AutoSessionService::new(db.clone());
    let sync = SyncEngine::new(whoop.clone(), db.clone(), auto_sessions.clone());
    let matching = MatchingService::new(db.clone(), sync.clone());

    // Background sync worker: webhooks enqueue, the worker syncs
    let (sync_queue, rx) = SyncQueue::new();
    spawn_sync_worker(rx, sync.clone());
    tracing::info!("Sync worker started");

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        whoop,
        sync,
        matching,
        auto_sessions,
        sync_queue,
    });

    // Build router
    let app = training_journal::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("training_journal=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
