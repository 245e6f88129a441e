//! WHOOP connection and OAuth state models.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A user's WHOOP connection: encrypted OAuth grant plus integration settings.
///
/// Exactly one active row per user. Tokens are stored as base64 AEAD
/// ciphertext and only ever decrypted inside the token vault. The row is
/// deliberately not serializable; API responses use [`ConnectionSummary`].
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WhoopConnection {
    /// Journal user ID (primary key)
    pub user_id: i64,
    /// WHOOP's numeric user ID for this account
    pub whoop_user_id: i64,
    /// Encrypted access token (base64)
    pub access_token_encrypted: String,
    /// Encrypted refresh token (base64)
    pub refresh_token_encrypted: String,
    /// When the access token expires
    pub token_expires_at: DateTime<Utc>,
    /// Granted OAuth scopes, space-separated
    pub scopes: String,
    /// Create draft sessions from unmatched imported workouts
    pub auto_create_sessions: bool,
    /// Auto-fill readiness check-ins from recovery scores
    pub auto_fill_readiness: bool,
    /// Last successful sync, if any
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Inactive connections are ignored by webhook resolution
    pub is_active: bool,
    /// When the user first connected
    pub created_at: DateTime<Utc>,
}

impl WhoopConnection {
    /// Granted scopes as a list.
    pub fn scope_list(&self) -> Vec<&str> {
        self.scopes.split_whitespace().collect()
    }
}

/// Short-lived CSRF state token for the OAuth handshake.
///
/// Single-use: consumed (deleted) on first validation attempt regardless
/// of outcome.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OAuthState {
    /// Opaque random value carried through the authorize redirect
    pub state: String,
    /// User who initiated the flow
    pub user_id: i64,
    /// Hard expiry (10 minutes after creation)
    pub expires_at: DateTime<Utc>,
}

/// Connection summary returned to API clients. Never carries token material.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSummary {
    pub whoop_user_id: i64,
    pub scopes: Vec<String>,
    pub auto_create_sessions: bool,
    pub auto_fill_readiness: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub connected_at: DateTime<Utc>,
}

impl From<&WhoopConnection> for ConnectionSummary {
    fn from(conn: &WhoopConnection) -> Self {
        Self {
            whoop_user_id: conn.whoop_user_id,
            scopes: conn.scope_list().iter().map(|s| s.to_string()).collect(),
            auto_create_sessions: conn.auto_create_sessions,
            auto_fill_readiness: conn.auto_fill_readiness,
            last_synced_at: conn.last_synced_at,
            connected_at: conn.created_at,
        }
    }
}
