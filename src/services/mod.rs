//! Service layer: WHOOP client and token vault, sync engine, matching,
//! auto-session creation, background jobs, token encryption.

pub mod autosession;
pub mod crypto;
pub mod jobs;
pub mod matching;
pub mod sync;
pub mod whoop;

pub use autosession::AutoSessionService;
pub use crypto::TokenCipher;
pub use jobs::{spawn_sync_worker, SyncJob, SyncQueue};
pub use matching::MatchingService;
pub use sync::SyncEngine;
pub use whoop::{WhoopClient, WhoopService};
