// SPDX-License-Identifier: MIT

//! Training Journal: WHOOP wearable integration service.
//!
//! This crate provides the backend for connecting a journal account to
//! WHOOP: OAuth token lifecycle, signed webhook ingestion, paginated
//! sync into local caches, workout-to-session matching, and auto-created
//! draft sessions.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::Db;
use services::{AutoSessionService, MatchingService, SyncEngine, SyncQueue, WhoopService};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: Db,
    pub whoop: WhoopService,
    pub sync: SyncEngine,
    pub matching: MatchingService,
    pub auto_sessions: AutoSessionService,
    pub sync_queue: SyncQueue,
}
